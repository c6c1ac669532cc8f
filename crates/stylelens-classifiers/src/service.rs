//! Style prediction service
//!
//! [`StylePredictor`] owns the embedding extractor and the head registry. It is
//! built once, wrapped in an `Arc`, and shared read-only by every request.

use candle_core::Device;
use std::sync::Arc;
use stylelens_core::{Error, Gender, Prediction, Result};
use tracing::{debug, info, warn};

use crate::config::ModelsConfig;
use crate::embedder::{ClipEmbedder, EmbeddingExtractor};
use crate::head::HeadArchitecture;
use crate::preprocess::preprocess;
use crate::registry::HeadRegistry;
use crate::scoring::{predict_from_probabilities, probabilities};

/// Result of a prediction request
#[derive(Debug, Clone, PartialEq)]
pub enum PredictOutcome {
    /// A head classified the image
    Predicted(Prediction),
    /// No head serves this gender key (unknown key or failed load)
    Unavailable { gender_key: String },
}

/// What the predictor managed to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictorStatus {
    /// Name of the loaded image encoder
    pub embedder: Option<String>,
    pub heads: Vec<(Gender, Option<HeadArchitecture>)>,
}

/// Image to style label, per gender
pub struct StylePredictor {
    extractor: Option<EmbeddingExtractor>,
    registry: HeadRegistry,
    device: Device,
    image_size: u32,
}

impl StylePredictor {
    pub fn new(
        extractor: Option<EmbeddingExtractor>,
        registry: HeadRegistry,
        device: Device,
        image_size: u32,
    ) -> Self {
        Self {
            extractor,
            registry,
            device,
            image_size,
        }
    }

    /// Load the encoder and both heads.
    ///
    /// Blocking: may download weights. Every failure is logged and leaves the
    /// matching capability unavailable.
    pub fn load(config: &ModelsConfig) -> Self {
        let device = match config.device.to_device() {
            Ok(device) => device,
            Err(e) => {
                warn!("✗ {}; falling back to CPU", e);
                Device::Cpu
            }
        };

        let extractor = match ClipEmbedder::load(&config.embedder, &device) {
            Ok(embedder) => {
                let extractor = EmbeddingExtractor::new(Box::new(embedder));
                info!("✓ Loaded image encoder: {}", extractor.name());
                Some(extractor)
            }
            Err(e) => {
                warn!("✗ Failed to load image encoder: {}", e);
                None
            }
        };

        let registry = HeadRegistry::load_from_config(&config.heads, &device);

        Self::new(extractor, registry, device, config.image_size)
    }

    pub fn status(&self) -> PredictorStatus {
        PredictorStatus {
            embedder: self.extractor.as_ref().map(|e| e.name().to_string()),
            heads: self.registry.status(),
        }
    }

    /// Classify an image for a gender key on the current thread
    pub fn predict_blocking(&self, gender_key: &str, image: &[u8]) -> Result<PredictOutcome> {
        let pixels = preprocess(image, self.image_size, &self.device)?;

        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| Error::embedding("image encoder is not loaded"))?;
        let embedding = extractor.extract(&pixels)?;

        let resolved = gender_key
            .parse::<Gender>()
            .ok()
            .and_then(|g| self.registry.get(g).map(|entry| (g, entry)));
        let (gender, entry) = match resolved {
            Some(found) => found,
            None => {
                debug!("No head for gender key '{}'", gender_key);
                return Ok(PredictOutcome::Unavailable {
                    gender_key: gender_key.to_string(),
                });
            }
        };

        let scores = entry
            .head
            .forward(&embedding)
            .map_err(|e| Error::classifier(format!("{} head forward failed: {}", gender_key, e)))?;
        let probs = probabilities(&scores)?;

        let prediction = predict_from_probabilities(gender, &entry.labels, probs)?;

        info!(
            gender = %gender,
            "📸 {} ({})",
            prediction.label,
            prediction.confidence_percent()
        );
        info!(gender = %gender, "📊 {:?}", prediction.probability_percentages());

        Ok(PredictOutcome::Predicted(prediction))
    }

    /// Classify an image without blocking the async executor
    pub async fn predict(self: Arc<Self>, gender_key: String, image: Vec<u8>) -> Result<PredictOutcome> {
        tokio::task::spawn_blocking(move || self.predict_blocking(&gender_key, &image))
            .await
            .map_err(|e| Error::internal(format!("Prediction task failed: {}", e)))?
    }
}
