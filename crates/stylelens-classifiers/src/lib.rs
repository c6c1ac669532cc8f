//! StyleLens Classifiers
//!
//! Fashion style classification from photographs.
//!
//! An image is decoded, resized to a square, and encoded by CLIP ViT-B/32 into
//! a unit-norm 512-dimensional embedding. A small classifier head, chosen by
//! gender, maps the embedding to scores over four styles:
//! - `Deep` head: 512 → 512 → 256 → 4
//! - `Shallow` head: 512 → 256 → 128 → 4
//!
//! Heads are loaded from trained weights files whose architecture is read from
//! a metadata sidecar or inferred from the parameter shapes.

pub mod config;
pub mod embedder;
pub mod head;
pub mod head_loader;
pub mod preprocess;
pub mod registry;
pub mod scoring;
pub mod service;

pub use config::{DeviceSpec, EmbedderConfig, HeadConfig, HeadsConfig, ModelsConfig};
pub use embedder::{ClipEmbedder, EmbeddingExtractor, ImageEmbedder};
pub use head::{ClassifierHead, HeadArchitecture, EMBEDDING_DIM};
pub use head_loader::{load_head, Detection, HeadMetadata, LoadError, LoadedHead, ModelFormat};
pub use registry::{HeadRegistry, RegisteredHead};
pub use service::{PredictOutcome, PredictorStatus, StylePredictor};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::embedder::{EmbeddingExtractor, ImageEmbedder};
    pub use crate::head::HeadArchitecture;
    pub use crate::registry::HeadRegistry;
    pub use crate::service::{PredictOutcome, StylePredictor};
    pub use crate::ModelsConfig;
}
