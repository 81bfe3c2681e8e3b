//! Configuration for models, datasets and training runs
//!
//! Every section has a `Default` matching the reference setup, so a YAML
//! file only needs to name what it changes:
//!
//! ```yaml
//! data_root: data/ratings
//! rater:
//!   graph:
//!     n_layers: 2
//!     embed_size: 10
//!     hidden_size: 10
//! training:
//!   epochs: 5
//!   learning_rate: 0.0005
//! ```

use crate::graph::DEFAULT_RELATION_COUNT;
use dialograph_layers::{ComputeDevice, EdgeWeightPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Graph embedding stack hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphEmbeddingConfig {
    /// Propagation rounds. Every round applies the same relation-aware and
    /// self-aware layer, so more than one round needs `embed_size == hidden_size`
    pub n_layers: usize,
    pub n_relations: usize,
    /// Encoder output width
    pub embed_size: usize,
    /// Node width after propagation, also the pooled dialog embedding width
    pub hidden_size: usize,
    pub edge_weights: EdgeWeightPolicy,
    pub device: ComputeDevice,
    /// Seed for parameter initialisation
    pub seed: u64,
}

impl Default for GraphEmbeddingConfig {
    fn default() -> Self {
        Self {
            n_layers: 1,
            n_relations: DEFAULT_RELATION_COUNT,
            embed_size: 384,
            hidden_size: 384,
            edge_weights: EdgeWeightPolicy::Cosine,
            device: ComputeDevice::Cpu,
            seed: 42,
        }
    }
}

impl GraphEmbeddingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.n_layers == 0 {
            return Err(ConfigError::Invalid("n_layers must be at least 1".to_string()));
        }
        if self.n_relations == 0 {
            return Err(ConfigError::Invalid("n_relations must be at least 1".to_string()));
        }
        if self.embed_size == 0 || self.hidden_size == 0 {
            return Err(ConfigError::Invalid("embed_size and hidden_size must be positive".to_string()));
        }
        if self.n_layers > 1 && self.embed_size != self.hidden_size {
            return Err(ConfigError::Invalid(format!(
                "{} rounds reuse one layer pair, so embed_size {} must equal hidden_size {}",
                self.n_layers, self.embed_size, self.hidden_size
            )));
        }
        if let Some(factor) = self.edge_weights.decay_factor() {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(ConfigError::Invalid(format!("decay factor {factor} outside (0, 1]")));
            }
        }
        Ok(())
    }
}

/// Dialog rater: graph embedding plus a multi-dimension rating head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaterConfig {
    pub graph: GraphEmbeddingConfig,
    /// Quality dimensions scored per dialog
    pub n_dims: usize,
    /// ReLU hidden layers before the output projection; 0 means a single linear map
    pub n_hidden_layers: usize,
    pub hidden_dim: usize,
}

impl Default for RaterConfig {
    fn default() -> Self {
        Self {
            graph: GraphEmbeddingConfig::default(),
            n_dims: 4,
            n_hidden_layers: 0,
            hidden_dim: 128,
        }
    }
}

impl RaterConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.graph.validate()?;
        if self.n_dims == 0 {
            return Err(ConfigError::Invalid("n_dims must be at least 1".to_string()));
        }
        if self.n_hidden_layers > 0 && self.hidden_dim == 0 {
            return Err(ConfigError::Invalid("hidden_dim must be positive".to_string()));
        }
        Ok(())
    }
}

/// Pairwise dialog discriminator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscriminatorConfig {
    pub graph: GraphEmbeddingConfig,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            graph: GraphEmbeddingConfig {
                edge_weights: EdgeWeightPolicy::decayed(),
                ..GraphEmbeddingConfig::default()
            },
        }
    }
}

impl DiscriminatorConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.graph.validate()
    }
}

/// Epoch loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
    /// Cap on training examples
    pub n_training_points: Option<usize>,
    pub shuffle: bool,
    /// Seed for batch shuffling
    pub seed: u64,
    /// Number of recent batches in the windowed loss
    pub loss_window: usize,
    pub save_every_epoch: bool,
    pub checkpoint_dir: PathBuf,
    /// Where epoch snapshots are written
    pub output_dir: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            epochs: 1,
            batch_size: 16,
            n_training_points: None,
            shuffle: true,
            seed: 0,
            loss_window: 10,
            save_every_epoch: false,
            checkpoint_dir: PathBuf::from("ckpts"),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ConfigError::Invalid(format!("learning_rate {} must be positive", self.learning_rate)));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        if self.loss_window == 0 {
            return Err(ConfigError::Invalid("loss_window must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialographConfig {
    pub data_root: PathBuf,
    pub rater: RaterConfig,
    pub discriminator: DiscriminatorConfig,
    pub training: TrainingConfig,
}

impl Default for DialographConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            rater: RaterConfig::default(),
            discriminator: DiscriminatorConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl DialographConfig {
    /// Load and validate a YAML configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.rater.validate()?;
        self.discriminator.validate()?;
        self.training.validate()
    }
}
