//! Dialograph
//!
//! Graph neural networks over multi-turn dialogs. Utterances become nodes,
//! discourse relations become typed edges weighted by embedding similarity,
//! and relation-aware message passing pools each dialog into one vector that
//! is either rated along several quality dimensions or compared against a
//! second dialog.
//!
//! # Pipeline
//!
//! utterances → [`embed::UtteranceEncoder`] → edge weights → propagation
//! rounds → mean pooling → task head → loss
//!
//! Tensors, autograd and the Adam optimizer come from `candle`.
//!
//! - [`graph`]: dialog graphs and batching
//! - [`embed`]: utterance encoders
//! - [`model`]: graph embedding stack, rater, discriminator, losses
//! - [`dataset`]: raw file processing, cached splits, batching
//! - [`training`]: epoch loop, checkpoints, snapshots
//! - [`config`]: YAML-loadable configuration
//!
//! ## Example Usage
//!
//! ```rust
//! use dialograph::config::RaterConfig;
//! use dialograph::embed::HashingEncoder;
//! use dialograph::graph::{DialogEdge, DialogGraph, GraphBatch, Utterance};
//! use dialograph::model::{DialogModel, DialogRater};
//!
//! let dialog = DialogGraph::new(
//!     vec![Utterance::from("how do I reset my password"), Utterance::from("use the settings page")],
//!     vec![DialogEdge::new(0, 1, 0u16)],
//!     9,
//! )
//! .unwrap();
//!
//! let mut config = RaterConfig::default();
//! config.graph.embed_size = 32;
//! config.graph.hidden_size = 32;
//! let rater = DialogRater::new(config).unwrap();
//!
//! let batch = GraphBatch::from_graphs([&dialog]);
//! let scores = rater.predict(&HashingEncoder::new(32), &batch).unwrap();
//! assert_eq!(scores.dims(), &[1, 4]);
//! ```

pub mod config;
pub mod dataset;
pub mod embed;
pub mod graph;
pub mod model;
pub mod training;

// Re-export main types for convenience
pub use config::{
    ConfigError, ConfigResult, DialographConfig, DiscriminatorConfig, GraphEmbeddingConfig, RaterConfig,
    TrainingConfig,
};

pub use dataset::{
    DataLoader, DatasetError, DatasetResult, DiscriminationDataset, LabelStats, PairRecord, RatingDataset,
    RatingRecord, Split,
};

pub use embed::{EncoderError, EncoderResult, HashingEncoder, PrecomputedEncoder, UtteranceEncoder};

pub use graph::{DialogEdge, DialogGraph, GraphBatch, GraphError, GraphResult, PairBatch, RelationType, Utterance};

pub use model::{
    DialogDiscriminator, DialogModel, DialogRater, GraphEmbedding, HingeLoss, Loss, ModelError, ModelResult,
    MultiDimensionAbsLoss,
};

pub use training::{CheckpointName, EpochSnapshot, ModelManager, TrainingError, TrainingResult};

pub use dialograph_layers::{ComputeDevice, EdgeWeightPolicy};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
