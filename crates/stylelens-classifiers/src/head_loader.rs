//! Classifier head loading with architecture detection
//!
//! A weights file carries no architecture of its own. The loader resolves it
//! in two ways:
//!
//! 1. An optional metadata sidecar next to the weights (`<stem>.json`) names
//!    the architecture and, optionally, the label order. Tagged weights are
//!    validated against that architecture only.
//! 2. Untagged weights are probed against every known architecture in
//!    [`HeadArchitecture::CANDIDATES`] order. A candidate matches only if the
//!    parameter names and shapes agree exactly.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::head::{ClassifierHead, HeadArchitecture};
use stylelens_core::StyleLabels;

/// Batch-norm step counters are exported by PyTorch but unused at inference.
const TOLERATED_SUFFIX: &str = ".num_batches_tracked";

/// Serialized weights format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// SafeTensors format (recommended)
    SafeTensors,
    /// PyTorch pickle/zip format (`torch.save` of a state dict)
    PyTorch,
}

impl ModelFormat {
    /// Infer the format from a file extension; anything unknown is treated as PyTorch
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("safetensors") => Self::SafeTensors,
            _ => Self::PyTorch,
        }
    }
}

/// Metadata stored next to a weights file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadMetadata {
    /// Architecture the weights were exported from
    #[serde(default)]
    pub architecture: Option<HeadArchitecture>,

    /// Class order used at training time
    #[serde(default)]
    pub labels: Option<StyleLabels>,
}

impl HeadMetadata {
    /// Sidecar path for a weights file: same directory and stem, `.json` extension
    pub fn sidecar_path(weights: &Path) -> PathBuf {
        weights.with_extension("json")
    }

    /// Read the sidecar for a weights file, if one exists
    pub fn read_for(weights: &Path) -> Result<Option<Self>, LoadError> {
        let path = Self::sidecar_path(weights);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| LoadError::InvalidMetadata {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| LoadError::InvalidMetadata {
                path,
                reason: e.to_string(),
            })
    }

    /// Write this metadata as the sidecar of a weights file
    pub fn write_for(&self, weights: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::sidecar_path(weights), json)
    }
}

/// Why a set of tensors does not fit an architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeIssue {
    /// An expected parameter is absent
    Missing { name: String },
    /// The file holds a parameter the architecture does not have
    Unexpected { name: String },
    /// A parameter exists with the wrong shape
    Shape {
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

impl fmt::Display for ShapeIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name } => write!(f, "missing parameter '{}'", name),
            Self::Unexpected { name } => write!(f, "unexpected parameter '{}'", name),
            Self::Shape {
                name,
                expected,
                found,
            } => write!(
                f,
                "parameter '{}' has shape {:?}, expected {:?}",
                name, found, expected
            ),
        }
    }
}

/// Failure to produce a classifier head from a weights file
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("weights file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("weights file {} is unreadable: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("metadata sidecar {} is invalid: {reason}", .path.display())]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error("weights do not match tagged architecture '{architecture}': {}", summarize(.issues))]
    ArchitectureMismatch {
        architecture: HeadArchitecture,
        issues: Vec<ShapeIssue>,
    },

    #[error("weights match no known architecture ({})", summarize_attempts(.attempts))]
    NoMatchingArchitecture {
        attempts: Vec<(HeadArchitecture, Vec<ShapeIssue>)>,
    },

    #[error("failed to build '{architecture}' head: {reason}")]
    Build {
        architecture: HeadArchitecture,
        reason: String,
    },
}

impl From<LoadError> for stylelens_core::Error {
    fn from(err: LoadError) -> Self {
        stylelens_core::Error::classifier(err.to_string())
    }
}

fn summarize(issues: &[ShapeIssue]) -> String {
    const SHOWN: usize = 3;
    let mut parts: Vec<String> = issues.iter().take(SHOWN).map(|i| i.to_string()).collect();
    if issues.len() > SHOWN {
        parts.push(format!("and {} more", issues.len() - SHOWN));
    }
    parts.join("; ")
}

fn summarize_attempts(attempts: &[(HeadArchitecture, Vec<ShapeIssue>)]) -> String {
    attempts
        .iter()
        .map(|(arch, issues)| format!("{}: {}", arch, summarize(issues)))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// How the architecture of a loaded head was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// Named by the metadata sidecar
    Tagged,
    /// Found by matching parameter shapes
    Probed,
}

/// A classifier head ready for inference, with whatever the sidecar provided
#[derive(Debug, Clone)]
pub struct LoadedHead {
    pub head: ClassifierHead,
    pub labels: Option<StyleLabels>,
    pub detection: Detection,
}

/// Load a classifier head from a weights file.
///
/// `name` is only used for logging.
pub fn load_head(path: &Path, name: &str, device: &Device) -> Result<LoadedHead, LoadError> {
    info!("Loading {} head from {}", name, path.display());

    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let tensors = read_tensors(path)?;
    let metadata = HeadMetadata::read_for(path)?.unwrap_or_default();

    let (architecture, detection) = match metadata.architecture {
        Some(architecture) => {
            let issues = check_architecture(&tensors, architecture);
            if !issues.is_empty() {
                return Err(LoadError::ArchitectureMismatch {
                    architecture,
                    issues,
                });
            }
            debug!("{}: architecture '{}' taken from sidecar", name, architecture);
            (architecture, Detection::Tagged)
        }
        None => (detect_architecture(&tensors, name)?, Detection::Probed),
    };

    let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
    let head = ClassifierHead::load(architecture, vb).map_err(|e| LoadError::Build {
        architecture,
        reason: e.to_string(),
    })?;

    info!(
        "{}: loaded '{}' head ({:?})",
        name,
        architecture,
        detection
    );

    Ok(LoadedHead {
        head,
        labels: metadata.labels,
        detection,
    })
}

/// Read every tensor in a weights file onto the CPU
pub fn read_tensors(path: &Path) -> Result<HashMap<String, Tensor>, LoadError> {
    let corrupt = |e: candle_core::Error| LoadError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    match ModelFormat::from_path(path) {
        ModelFormat::SafeTensors => candle_core::safetensors::load(path, &Device::Cpu).map_err(corrupt),
        ModelFormat::PyTorch => candle_core::pickle::read_all(path)
            .map(|tensors| tensors.into_iter().collect())
            .map_err(corrupt),
    }
}

/// Find the first candidate architecture whose parameters match exactly
pub fn detect_architecture(
    tensors: &HashMap<String, Tensor>,
    name: &str,
) -> Result<HeadArchitecture, LoadError> {
    let mut attempts = Vec::new();

    for candidate in HeadArchitecture::CANDIDATES {
        let issues = check_architecture(tensors, candidate);
        if issues.is_empty() {
            debug!("{}: parameters match '{}'", name, candidate);
            return Ok(candidate);
        }
        debug!(
            "{}: not a '{}' head ({} issues, first: {})",
            name,
            candidate,
            issues.len(),
            issues[0]
        );
        attempts.push((candidate, issues));
    }

    warn!("{}: weights match no known architecture", name);
    Err(LoadError::NoMatchingArchitecture { attempts })
}

/// Compare tensors against an architecture; an empty result means an exact match
pub fn check_architecture(
    tensors: &HashMap<String, Tensor>,
    architecture: HeadArchitecture,
) -> Vec<ShapeIssue> {
    let expected = architecture.expected_parameters();
    let mut issues = Vec::new();

    for spec in &expected {
        match tensors.get(&spec.name) {
            None => issues.push(ShapeIssue::Missing {
                name: spec.name.clone(),
            }),
            Some(tensor) if tensor.dims() != spec.shape.as_slice() => {
                issues.push(ShapeIssue::Shape {
                    name: spec.name.clone(),
                    expected: spec.shape.clone(),
                    found: tensor.dims().to_vec(),
                })
            }
            Some(_) => {}
        }
    }

    let known: HashSet<&str> = expected.iter().map(|s| s.name.as_str()).collect();
    let mut unexpected: Vec<&String> = tensors
        .keys()
        .filter(|name| !known.contains(name.as_str()) && !name.ends_with(TOLERATED_SUFFIX))
        .collect();
    unexpected.sort();
    issues.extend(
        unexpected
            .into_iter()
            .map(|name| ShapeIssue::Unexpected { name: name.clone() }),
    );

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use stylelens_core::Gender;
    use tempfile::TempDir;

    fn write_weights(dir: &TempDir, file: &str, tensors: &HashMap<String, Tensor>) -> PathBuf {
        let path = dir.path().join(file);
        candle_core::safetensors::save(tensors, &path).unwrap();
        path
    }

    fn params(architecture: HeadArchitecture) -> HashMap<String, Tensor> {
        architecture.random_parameters(&Device::Cpu).unwrap()
    }

    #[test]
    fn test_deep_weights_select_deep() {
        let dir = TempDir::new().unwrap();
        let path = write_weights(&dir, "male_model.safetensors", &params(HeadArchitecture::Deep));

        let loaded = load_head(&path, "male", &Device::Cpu).unwrap();
        assert_eq!(loaded.head.architecture(), HeadArchitecture::Deep);
        assert_eq!(loaded.detection, Detection::Probed);
        assert!(loaded.labels.is_none());
    }

    #[test]
    fn test_shallow_weights_select_shallow() {
        let dir = TempDir::new().unwrap();
        let path = write_weights(&dir, "female_model.safetensors", &params(HeadArchitecture::Shallow));

        let loaded = load_head(&path, "female", &Device::Cpu).unwrap();
        assert_eq!(loaded.head.architecture(), HeadArchitecture::Shallow);
    }

    #[test]
    fn test_unmatched_weights_report_both_attempts() {
        let dir = TempDir::new().unwrap();
        let mut tensors = HashMap::new();
        tensors.insert(
            "fc.weight".to_string(),
            Tensor::zeros((4, 512), DType::F32, &Device::Cpu).unwrap(),
        );
        let path = write_weights(&dir, "other.safetensors", &tensors);

        match load_head(&path, "other", &Device::Cpu) {
            Err(LoadError::NoMatchingArchitecture { attempts }) => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].0, HeadArchitecture::Deep);
                assert_eq!(attempts[1].0, HeadArchitecture::Shallow);
                assert!(attempts[0]
                    .1
                    .contains(&ShapeIssue::Unexpected { name: "fc.weight".to_string() }));
            }
            other => panic!("expected NoMatchingArchitecture, got {:?}", other.map(|l| l.detection)),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("male_model.pth");

        let err = load_head(&path, "male", &Device::Cpu).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(p) if p == path));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("male_model.safetensors");
        std::fs::write(&path, b"definitely not a tensor file").unwrap();

        let err = load_head(&path, "male", &Device::Cpu).unwrap_err();
        assert!(matches!(err, LoadError::Corrupt { .. }));
    }

    #[test]
    fn test_garbage_pth_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("female_model.pth");
        std::fs::write(&path, b"PK\x03\x04 truncated").unwrap();

        let err = load_head(&path, "female", &Device::Cpu).unwrap_err();
        assert!(matches!(err, LoadError::Corrupt { .. }));
    }

    #[test]
    fn test_shape_mismatch_detected() {
        let mut tensors = params(HeadArchitecture::Deep);
        tensors.insert(
            "layers.8.weight".to_string(),
            Tensor::zeros((5, 256), DType::F32, &Device::Cpu).unwrap(),
        );

        let issues = check_architecture(&tensors, HeadArchitecture::Deep);
        assert_eq!(
            issues,
            vec![ShapeIssue::Shape {
                name: "layers.8.weight".to_string(),
                expected: vec![4, 256],
                found: vec![5, 256],
            }]
        );
    }

    #[test]
    fn test_extra_parameter_rejected() {
        let mut tensors = params(HeadArchitecture::Shallow);
        tensors.insert(
            "layers.9.weight".to_string(),
            Tensor::zeros((4, 4), DType::F32, &Device::Cpu).unwrap(),
        );

        let issues = check_architecture(&tensors, HeadArchitecture::Shallow);
        assert_eq!(issues, vec![ShapeIssue::Unexpected { name: "layers.9.weight".to_string() }]);
    }

    #[test]
    fn test_missing_parameter_rejected() {
        let mut tensors = params(HeadArchitecture::Deep);
        tensors.remove("layers.1.running_mean");

        let issues = check_architecture(&tensors, HeadArchitecture::Deep);
        assert_eq!(issues, vec![ShapeIssue::Missing { name: "layers.1.running_mean".to_string() }]);
    }

    #[test]
    fn test_batch_counters_tolerated() {
        let dir = TempDir::new().unwrap();
        let mut tensors = params(HeadArchitecture::Shallow);
        for layer in [1, 5] {
            tensors.insert(
                format!("layers.{layer}.num_batches_tracked"),
                Tensor::new(&[120u32], &Device::Cpu).unwrap(),
            );
        }
        let path = write_weights(&dir, "female_model.safetensors", &tensors);

        let loaded = load_head(&path, "female", &Device::Cpu).unwrap();
        assert_eq!(loaded.head.architecture(), HeadArchitecture::Shallow);
    }

    #[test]
    fn test_sidecar_tag_and_labels() {
        let dir = TempDir::new().unwrap();
        let path = write_weights(&dir, "male_model.safetensors", &params(HeadArchitecture::Shallow));
        let labels = StyleLabels::new(["Street Gorpcore", "Casual", "Minimal Chic Dandy", "Americaji Vintage"]).unwrap();
        HeadMetadata {
            architecture: Some(HeadArchitecture::Shallow),
            labels: Some(labels.clone()),
        }
        .write_for(&path)
        .unwrap();

        let loaded = load_head(&path, "male", &Device::Cpu).unwrap();
        assert_eq!(loaded.detection, Detection::Tagged);
        assert_eq!(loaded.head.architecture(), HeadArchitecture::Shallow);
        assert_eq!(loaded.labels, Some(labels));
    }

    #[test]
    fn test_sidecar_tag_mismatch_does_not_fall_back() {
        let dir = TempDir::new().unwrap();
        let path = write_weights(&dir, "male_model.safetensors", &params(HeadArchitecture::Shallow));
        HeadMetadata {
            architecture: Some(HeadArchitecture::Deep),
            labels: None,
        }
        .write_for(&path)
        .unwrap();

        let err = load_head(&path, "male", &Device::Cpu).unwrap_err();
        match err {
            LoadError::ArchitectureMismatch { architecture, issues } => {
                assert_eq!(architecture, HeadArchitecture::Deep);
                assert!(!issues.is_empty());
            }
            other => panic!("expected ArchitectureMismatch, got {other}"),
        }
    }

    #[test]
    fn test_sidecar_labels_only_still_probes() {
        let dir = TempDir::new().unwrap();
        let path = write_weights(&dir, "female_model.safetensors", &params(HeadArchitecture::Deep));
        std::fs::write(
            HeadMetadata::sidecar_path(&path),
            r#"{"labels": ["Casual Street", "Feminine Minimal", "Lovely", "Unique"]}"#,
        )
        .unwrap();

        let loaded = load_head(&path, "female", &Device::Cpu).unwrap();
        assert_eq!(loaded.detection, Detection::Probed);
        assert_eq!(loaded.labels, Some(StyleLabels::defaults_for(Gender::Female)));
    }

    #[test]
    fn test_invalid_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = write_weights(&dir, "male_model.safetensors", &params(HeadArchitecture::Deep));
        std::fs::write(HeadMetadata::sidecar_path(&path), r#"{"labels": ["only one"]}"#).unwrap();

        let err = load_head(&path, "male", &Device::Cpu).unwrap_err();
        assert!(matches!(err, LoadError::InvalidMetadata { .. }));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ModelFormat::from_path(Path::new("a.safetensors")), ModelFormat::SafeTensors);
        assert_eq!(ModelFormat::from_path(Path::new("male_model.pth")), ModelFormat::PyTorch);
        assert_eq!(ModelFormat::from_path(Path::new("weights.bin")), ModelFormat::PyTorch);
    }

    #[test]
    fn test_load_error_into_core_error() {
        let err: stylelens_core::Error = LoadError::NotFound(PathBuf::from("x.pth")).into();
        assert!(matches!(err, stylelens_core::Error::Classifier(_)));
    }
}
