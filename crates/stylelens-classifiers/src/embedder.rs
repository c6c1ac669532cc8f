//! Image embedding extraction
//!
//! [`ImageEmbedder`] is the seam between the prediction service and the
//! pretrained encoder. [`EmbeddingExtractor`] wraps any embedder and always
//! L2-normalises its output, since every classifier head was trained on
//! unit-norm embeddings.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::PathBuf;
use stylelens_core::{Error, Result};

use crate::config::EmbedderConfig;
use crate::head::EMBEDDING_DIM;

/// Pretrained encoder producing raw image features
pub trait ImageEmbedder: Send + Sync {
    /// Raw features for a `[batch, 3, H, W]` pixel tensor, shape `[batch, dim]`
    fn image_features(&self, pixel_values: &Tensor) -> Result<Tensor>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// CLIP vision tower plus projection (ViT-B/32)
pub struct ClipEmbedder {
    name: String,
    model: ClipModel,
}

impl ClipEmbedder {
    /// Load CLIP weights from a local file or the Hugging Face hub
    pub fn load(config: &EmbedderConfig, device: &Device) -> Result<Self> {
        let weights = match &config.weights {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::embedding(format!(
                        "Encoder weights do not exist: {}",
                        path.display()
                    )));
                }
                path.clone()
            }
            None => download_weights(&config.repo, &config.revision)?,
        };

        tracing::info!("Loading CLIP encoder from {}", weights.display());

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device)
                .map_err(|e| Error::embedding(format!("Failed to load encoder weights: {}", e)))?
        };

        let model = ClipModel::new(vb, &ClipConfig::vit_base_patch32())
            .map_err(|e| Error::embedding(format!("Failed to build CLIP model: {}", e)))?;

        Ok(Self {
            name: config.repo.clone(),
            model,
        })
    }
}

impl ImageEmbedder for ClipEmbedder {
    fn image_features(&self, pixel_values: &Tensor) -> Result<Tensor> {
        self.model
            .get_image_features(pixel_values)
            .map_err(|e| Error::embedding(format!("CLIP forward pass failed: {}", e)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn download_weights(repo: &str, revision: &str) -> Result<PathBuf> {
    tracing::info!("Fetching encoder weights from HuggingFace: {} @ {}", repo, revision);

    let api = Api::new()
        .map_err(|e| Error::embedding(format!("Failed to initialize HuggingFace API: {}", e)))?;

    api.repo(Repo::with_revision(
        repo.to_string(),
        RepoType::Model,
        revision.to_string(),
    ))
    .get("model.safetensors")
    .map_err(|e| Error::embedding(format!("Failed to download model.safetensors: {}", e)))
}

/// Produces unit-norm embeddings from pixel tensors
pub struct EmbeddingExtractor {
    embedder: Box<dyn ImageEmbedder>,
}

impl EmbeddingExtractor {
    pub fn new(embedder: Box<dyn ImageEmbedder>) -> Self {
        Self { embedder }
    }

    pub fn name(&self) -> &str {
        self.embedder.name()
    }

    /// `[batch, 512]` embeddings, each row with unit L2 norm
    pub fn extract(&self, pixel_values: &Tensor) -> Result<Tensor> {
        let features = self.embedder.image_features(pixel_values)?;

        let dim = features
            .dims()
            .last()
            .copied()
            .ok_or_else(|| Error::embedding("Encoder returned a scalar"))?;
        if features.rank() != 2 || dim != EMBEDDING_DIM {
            return Err(Error::embedding(format!(
                "Encoder returned shape {:?}, expected [batch, {}]",
                features.dims(),
                EMBEDDING_DIM
            )));
        }

        l2_normalize(&features)
            .map_err(|e| Error::embedding(format!("Failed to normalise embedding: {}", e)))
    }
}

/// Divide each row by its L2 norm
pub fn l2_normalize(features: &Tensor) -> candle_core::Result<Tensor> {
    let norm = features.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?;
    features.broadcast_div(&norm)
}
