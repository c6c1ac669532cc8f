//! Feed-forward classifier heads mapping an image embedding to style scores
//!
//! Both architectures share the layout exported by the training code:
//!
//! ```text
//! layers.0  Linear(512, h1)
//! layers.1  BatchNorm1d(h1)     (ReLU, Dropout follow; no parameters)
//! layers.4  Linear(h1, h2)
//! layers.5  BatchNorm1d(h2)
//! layers.8  Linear(h2, 4)
//! ```
//!
//! Heads only ever run in evaluation mode: batch-norm uses its running
//! statistics and dropout is the identity.

use candle_core::Tensor;
#[cfg(any(test, feature = "test-util"))]
use candle_core::{DType, Device};
use candle_nn::{BatchNorm, Linear, Module, ModuleT, VarBuilder};
use serde::{Deserialize, Serialize};
#[cfg(any(test, feature = "test-util"))]
use std::collections::HashMap;
use std::fmt;

use stylelens_core::NUM_STYLES;

/// Dimension of the image embedding every head consumes
pub const EMBEDDING_DIM: usize = 512;

/// Batch-norm epsilon used at training time
const BATCH_NORM_EPS: f64 = 1e-5;

/// Known classifier head shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadArchitecture {
    /// 512 -> 512 -> 256 -> 4
    Deep,
    /// 512 -> 256 -> 128 -> 4
    Shallow,
}

impl HeadArchitecture {
    /// Probe order for untagged weights; the first match wins
    pub const CANDIDATES: [HeadArchitecture; 2] = [HeadArchitecture::Deep, HeadArchitecture::Shallow];

    /// Widths of the two hidden layers
    pub fn hidden_sizes(&self) -> [usize; 2] {
        match self {
            Self::Deep => [512, 256],
            Self::Shallow => [256, 128],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deep => "deep",
            Self::Shallow => "shallow",
        }
    }

    /// Every parameter this architecture owns, with its exact shape
    pub fn expected_parameters(&self) -> Vec<ParameterSpec> {
        let mut specs = Vec::new();
        let mut in_dim = EMBEDDING_DIM;

        for (block, width) in self.hidden_sizes().into_iter().enumerate() {
            let linear = format!("layers.{}", block * 4);
            let norm = format!("layers.{}", block * 4 + 1);

            specs.push(ParameterSpec::new(format!("{linear}.weight"), &[width, in_dim]));
            specs.push(ParameterSpec::new(format!("{linear}.bias"), &[width]));
            for stat in ["weight", "bias", "running_mean", "running_var"] {
                specs.push(ParameterSpec::new(format!("{norm}.{stat}"), &[width]));
            }
            in_dim = width;
        }

        let output = format!("layers.{}", self.hidden_sizes().len() * 4);
        specs.push(ParameterSpec::new(format!("{output}.weight"), &[NUM_STYLES, in_dim]));
        specs.push(ParameterSpec::new(format!("{output}.bias"), &[NUM_STYLES]));

        specs
    }

    /// Freshly initialised parameters for this architecture.
    ///
    /// Linear weights are drawn from N(0, 0.05); batch-norm layers start as
    /// the identity (unit scale and variance, zero shift and mean). Fixture
    /// helper for tests and benchmarks; not built into release binaries.
    #[cfg(any(test, feature = "test-util"))]
    pub fn random_parameters(&self, device: &Device) -> candle_core::Result<HashMap<String, Tensor>> {
        let mut params = HashMap::new();
        for spec in self.expected_parameters() {
            let tensor = if spec.name.ends_with("running_var")
                || (spec.is_batch_norm() && spec.name.ends_with(".weight"))
            {
                Tensor::ones(spec.shape.as_slice(), DType::F32, device)?
            } else if spec.name.ends_with("running_mean") || spec.is_batch_norm() {
                Tensor::zeros(spec.shape.as_slice(), DType::F32, device)?
            } else {
                Tensor::randn(0f32, 0.05, spec.shape.as_slice(), device)?
            };
            params.insert(spec.name, tensor);
        }
        Ok(params)
    }
}

impl fmt::Display for HeadArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and shape of one expected parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ParameterSpec {
    fn new(name: String, shape: &[usize]) -> Self {
        Self {
            name,
            shape: shape.to_vec(),
        }
    }

    // Batch-norm layers sit at odd `layers.N` indices.
    #[cfg(any(test, feature = "test-util"))]
    fn is_batch_norm(&self) -> bool {
        self.name
            .split('.')
            .nth(1)
            .and_then(|idx| idx.parse::<usize>().ok())
            .is_some_and(|idx| idx % 4 == 1)
    }
}

/// A loaded classifier head in evaluation mode
#[derive(Debug, Clone)]
pub struct ClassifierHead {
    architecture: HeadArchitecture,
    blocks: Vec<(Linear, BatchNorm)>,
    output: Linear,
}

impl ClassifierHead {
    /// Build a head from a variable builder rooted at the weights' top level
    pub fn load(architecture: HeadArchitecture, vb: VarBuilder) -> candle_core::Result<Self> {
        let layers = vb.pp("layers");
        let mut blocks = Vec::new();
        let mut in_dim = EMBEDDING_DIM;

        for (block, width) in architecture.hidden_sizes().into_iter().enumerate() {
            let linear = candle_nn::linear(in_dim, width, layers.pp(block * 4))?;
            let norm = candle_nn::batch_norm(width, BATCH_NORM_EPS, layers.pp(block * 4 + 1))?;
            blocks.push((linear, norm));
            in_dim = width;
        }

        let output = candle_nn::linear(in_dim, NUM_STYLES, layers.pp(blocks.len() * 4))?;

        Ok(Self {
            architecture,
            blocks,
            output,
        })
    }

    pub fn architecture(&self) -> HeadArchitecture {
        self.architecture
    }

    /// Map `[batch, 512]` embeddings to `[batch, 4]` unnormalised scores
    pub fn forward(&self, embedding: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = embedding.clone();
        for (linear, norm) in &self.blocks {
            xs = linear.forward(&xs)?;
            xs = norm.forward_t(&xs, false)?;
            xs = xs.relu()?;
        }
        self.output.forward(&xs)
    }
}
