//! Message-passing building blocks for dialog graphs
//!
//! Layers are built on `candle` tensors. Parameters live in a
//! [`candle_nn::VarMap`] and are created through a [`candle_nn::VarBuilder`],
//! so gradients come from autograd and a single optimizer steps every layer.

pub mod common;
pub mod params;
pub mod relation;
pub mod self_aware;
pub mod weights;
pub mod pool;

pub use common::{index_tensor, ComputeDevice, EdgeIndex, LayerError, LayerResult};
pub use params::{adam, assign_parameters, named_parameters, parameter_count, seed_parameters};
pub use relation::RelationAwareLayer;
pub use self_aware::SelfAwareLayer;
pub use weights::{pairwise_cosine_similarity, EdgeWeightBuilder, EdgeWeightPolicy, DEFAULT_DECAY_FACTOR};
pub use pool::segment_mean;
