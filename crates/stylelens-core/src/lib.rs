//! StyleLens Core
//!
//! Core types and error handling shared across StyleLens components.
//!
//! This crate provides:
//! - The error type and result alias used by every crate
//! - Gender keys, style label tables, and prediction results

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{unavailable_message, Gender, Prediction, StyleLabels, NUM_STYLES, UNKNOWN_LABEL};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{Gender, Prediction, StyleLabels};
}
