//! Turning head scores into a prediction

use candle_core::{Tensor, D};
use stylelens_core::{Error, Gender, Prediction, Result, StyleLabels};

/// Softmax over the class dimension of a `[1, classes]` score tensor
pub fn probabilities(scores: &Tensor) -> Result<Vec<f32>> {
    candle_nn::ops::softmax(scores, D::Minus1)
        .and_then(|p| p.flatten_all())
        .and_then(|p| p.to_vec1::<f32>())
        .map_err(|e| Error::classifier(format!("Softmax failed: {}", e)))
}

/// Index and value of the largest probability; ties go to the lowest index
pub fn argmax(probabilities: &[f32]) -> Option<(usize, f32)> {
    probabilities
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (idx, p)| match best {
            Some((_, best_p)) if best_p >= p => best,
            _ => Some((idx, p)),
        })
}

/// Build the prediction for a gender from a probability distribution
pub fn predict_from_probabilities(
    gender: Gender,
    labels: &StyleLabels,
    probabilities: Vec<f32>,
) -> Result<Prediction> {
    let (class_index, confidence) = argmax(&probabilities)
        .ok_or_else(|| Error::classifier("Classifier produced no scores"))?;

    Ok(Prediction {
        gender,
        label: labels.label_for(class_index).to_string(),
        class_index,
        confidence,
        probabilities,
    })
}
