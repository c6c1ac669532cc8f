//! Core types for StyleLens

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of style classes every classifier head emits
pub const NUM_STYLES: usize = 4;

/// Label reported when a predicted index falls outside the label table
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Gender key selecting which classifier head and label table apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// All supported gender keys, in a stable order
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    /// Wire token for this key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            other => Err(Error::config(format!("unsupported gender key '{}'", other))),
        }
    }
}

/// Ordered style label table for one classifier head.
///
/// The order must match the class order the head was trained with; index `i`
/// of the head's output is reported as `labels[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct StyleLabels(Vec<String>);

impl StyleLabels {
    /// Create a label table, which must hold exactly [`NUM_STYLES`] names
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.len() != NUM_STYLES {
            return Err(Error::config(format!(
                "label table must have {} entries, got {}",
                NUM_STYLES,
                labels.len()
            )));
        }
        Ok(Self(labels))
    }

    /// Built-in label table for a gender key
    pub fn defaults_for(gender: Gender) -> Self {
        let labels: [&str; NUM_STYLES] = match gender {
            Gender::Male => [
                "Americaji Vintage",
                "Casual",
                "Minimal Chic Dandy",
                "Street Gorpcore",
            ],
            Gender::Female => ["Casual Street", "Feminine Minimal", "Lovely", "Unique"],
        };
        Self(labels.iter().map(|s| s.to_string()).collect())
    }

    /// Label for a class index, or [`UNKNOWN_LABEL`] when out of range
    pub fn label_for(&self, index: usize) -> &str {
        self.0.get(index).map(String::as_str).unwrap_or(UNKNOWN_LABEL)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|l| l == label)
    }
}

impl TryFrom<Vec<String>> for StyleLabels {
    type Error = Error;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::new(labels)
    }
}

impl From<StyleLabels> for Vec<String> {
    fn from(labels: StyleLabels) -> Self {
        labels.0
    }
}

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Gender key the head was selected by
    pub gender: Gender,

    /// Human-readable style label
    pub label: String,

    /// Index of the winning class
    pub class_index: usize,

    /// Probability of the winning class (0.0-1.0)
    pub confidence: f32,

    /// Full distribution over classes in class-index order (each 0.0-1.0)
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// Confidence as a percentage string with one decimal, e.g. `"85.5%"`
    pub fn confidence_percent(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }

    /// Distribution as percentages rounded to one decimal place
    pub fn probability_percentages(&self) -> Vec<f32> {
        self.probabilities
            .iter()
            .map(|p| round_one_decimal(p * 100.0))
            .collect()
    }
}

/// Message returned in place of a label when no head serves a gender key.
///
/// The wording is part of the public response contract and is kept verbatim.
pub fn unavailable_message(gender_key: &str) -> String {
    format!("Error: {} 모델 로딩 실패", gender_key)
}

fn round_one_decimal(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
