//! Per-gender classifier head registry
//!
//! Built once at startup and read-only afterwards. A gender whose head failed
//! to load is simply absent; requests for it are answered as unavailable.

use candle_core::Device;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use stylelens_core::{Gender, StyleLabels};
use tracing::{info, warn};

use crate::config::HeadsConfig;
use crate::head::{ClassifierHead, HeadArchitecture};
use crate::head_loader::{load_head, Detection};

/// A head together with the label table it reports through
#[derive(Debug, Clone)]
pub struct RegisteredHead {
    pub head: ClassifierHead,
    pub labels: StyleLabels,
    pub detection: Detection,
    pub weights_path: PathBuf,
}

impl RegisteredHead {
    pub fn architecture(&self) -> HeadArchitecture {
        self.head.architecture()
    }
}

/// Registry for the classifier head serving each gender key
#[derive(Debug, Clone, Default)]
pub struct HeadRegistry {
    heads: HashMap<Gender, Arc<RegisteredHead>>,
}

impl HeadRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a head for a gender, replacing any previous one
    pub fn register(&mut self, gender: Gender, head: RegisteredHead) {
        self.heads.insert(gender, Arc::new(head));
    }

    /// Get the head for a gender
    pub fn get(&self, gender: Gender) -> Option<Arc<RegisteredHead>> {
        self.heads.get(&gender).cloned()
    }

    /// Loaded architecture per gender, `None` where unavailable
    pub fn status(&self) -> Vec<(Gender, Option<HeadArchitecture>)> {
        Gender::ALL
            .iter()
            .map(|g| (*g, self.heads.get(g).map(|h| h.architecture())))
            .collect()
    }

    /// Number of genders with a loaded head
    pub fn count(&self) -> usize {
        self.heads.len()
    }

    /// Load every configured head, skipping (and logging) the ones that fail.
    ///
    /// Label precedence: weights sidecar, then config, then built-in defaults.
    pub fn load_from_config(config: &HeadsConfig, device: &Device) -> Self {
        let mut registry = Self::new();

        for gender in Gender::ALL {
            let head_config = config.get(gender);

            match load_head(&head_config.weights, gender.as_str(), device) {
                Ok(loaded) => {
                    let labels = loaded
                        .labels
                        .or_else(|| head_config.labels.clone())
                        .unwrap_or_else(|| StyleLabels::defaults_for(gender));

                    let entry = RegisteredHead {
                        head: loaded.head,
                        labels,
                        detection: loaded.detection,
                        weights_path: head_config.weights.clone(),
                    };

                    info!(
                        "✓ {} head ready: {} ({:?}) from {}, labels {:?}",
                        gender,
                        entry.architecture(),
                        entry.detection,
                        entry.weights_path.display(),
                        entry.labels.as_slice()
                    );

                    registry.register(gender, entry);
                }
                Err(e) => {
                    warn!("✗ {} head unavailable: {}", gender, e);
                    // Continue with the other gender rather than failing startup
                }
            }
        }

        info!("Head registry initialized with {}/{} heads", registry.count(), Gender::ALL.len());
        registry
    }
}
