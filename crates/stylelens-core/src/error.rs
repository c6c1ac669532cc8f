//! Error types for StyleLens

/// Result type alias using StyleLens's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for StyleLens operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Classifier head loading or execution errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Image encoder loading or execution errors
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Image payload could not be decoded or preprocessed
    #[error("image error: {0}")]
    Image(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a new image error
    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short machine-readable kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classifier(_) => "classifier",
            Self::Embedding(_) => "embedding",
            Self::Image(_) => "image",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}
