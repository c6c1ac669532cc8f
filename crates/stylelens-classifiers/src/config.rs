//! Configuration for the image encoder and classifier heads

use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use stylelens_core::{Error, Gender, Result, StyleLabels};

use crate::preprocess::DEFAULT_IMAGE_SIZE;

/// Configuration for every model the service loads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Device to run inference on
    #[serde(default)]
    pub device: DeviceSpec,

    /// Square side length images are resized to before encoding
    #[serde(default = "default_image_size")]
    pub image_size: u32,

    /// Image encoder
    #[serde(default)]
    pub embedder: EmbedderConfig,

    /// Classifier heads by gender
    #[serde(default)]
    pub heads: HeadsConfig,
}

/// Image encoder source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Hugging Face repository holding the CLIP weights
    #[serde(default = "default_embedder_repo")]
    pub repo: String,

    /// Repository revision
    #[serde(default = "default_embedder_revision")]
    pub revision: String,

    /// Local safetensors file; takes precedence over the hub when set
    #[serde(default)]
    pub weights: Option<PathBuf>,
}

/// Classifier head per gender key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadsConfig {
    #[serde(default = "default_male_head")]
    pub male: HeadConfig,

    #[serde(default = "default_female_head")]
    pub female: HeadConfig,
}

/// One classifier head
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadConfig {
    /// Weights file (`.pth`, `.pt`, `.bin`, or `.safetensors`)
    pub weights: PathBuf,

    /// Label order override; the weights' sidecar wins over this
    #[serde(default)]
    pub labels: Option<StyleLabels>,
}

/// Device specification (for config files).
///
/// Written as `cpu`, `cuda`, `metal`, or with an ordinal such as `cuda:1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda { index: Option<usize> },
    Metal { index: Option<usize> },
}

impl DeviceSpec {
    /// Create the candle device
    pub fn to_device(&self) -> Result<Device> {
        match self {
            DeviceSpec::Cpu => Ok(Device::Cpu),
            DeviceSpec::Cuda { index } => Device::new_cuda(index.unwrap_or(0))
                .map_err(|e| Error::config(format!("Failed to create CUDA device: {}", e))),
            DeviceSpec::Metal { index } => Device::new_metal(index.unwrap_or(0))
                .map_err(|e| Error::config(format!("Failed to create Metal device: {}", e))),
        }
    }
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, index) = match s.split_once(':') {
            Some((kind, ordinal)) => {
                let index = ordinal
                    .parse::<usize>()
                    .map_err(|_| Error::config(format!("invalid device ordinal in '{}'", s)))?;
                (kind, Some(index))
            }
            None => (s, None),
        };

        match (kind, index) {
            ("cpu", None) => Ok(DeviceSpec::Cpu),
            ("cuda", index) => Ok(DeviceSpec::Cuda { index }),
            ("metal", index) => Ok(DeviceSpec::Metal { index }),
            _ => Err(Error::config(format!(
                "unknown device '{}' (expected cpu, cuda[:N] or metal[:N])",
                s
            ))),
        }
    }
}

impl TryFrom<String> for DeviceSpec {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeviceSpec> for String {
    fn from(spec: DeviceSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, index) = match self {
            DeviceSpec::Cpu => ("cpu", None),
            DeviceSpec::Cuda { index } => ("cuda", *index),
            DeviceSpec::Metal { index } => ("metal", *index),
        };
        match index {
            Some(index) => write!(f, "{}:{}", kind, index),
            None => f.write_str(kind),
        }
    }
}

impl HeadsConfig {
    pub fn get(&self, gender: Gender) -> &HeadConfig {
        match gender {
            Gender::Male => &self.male,
            Gender::Female => &self.female,
        }
    }

    pub fn get_mut(&mut self, gender: Gender) -> &mut HeadConfig {
        match gender {
            Gender::Male => &mut self.male,
            Gender::Female => &mut self.female,
        }
    }
}

impl ModelsConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            device: DeviceSpec::Cpu,
            image_size: default_image_size(),
            embedder: EmbedderConfig::default(),
            heads: HeadsConfig::default(),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            repo: default_embedder_repo(),
            revision: default_embedder_revision(),
            weights: None,
        }
    }
}

impl Default for HeadsConfig {
    fn default() -> Self {
        Self {
            male: default_male_head(),
            female: default_female_head(),
        }
    }
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

fn default_embedder_repo() -> String {
    "openai/clip-vit-base-patch32".to_string()
}

// The main branch only ships pytorch weights; this PR adds model.safetensors.
fn default_embedder_revision() -> String {
    "refs/pr/15".to_string()
}

fn default_male_head() -> HeadConfig {
    HeadConfig {
        weights: PathBuf::from("male_model.pth"),
        labels: None,
    }
}

fn default_female_head() -> HeadConfig {
    HeadConfig {
        weights: PathBuf::from("female_model.pth"),
        labels: None,
    }
}
