//! Graph models over dialog batches
//!
//! - [`GraphEmbedding`]: encoder → edge weights → propagation rounds → mean pool
//! - [`DialogRater`]: one dialog embedding → per-dimension quality scores
//! - [`DialogDiscriminator`]: two dialog embeddings → one comparison score
//!
//! Parameters of a model live in one [`VarMap`]; gradients come from candle's
//! autograd. Forward passes are deterministic: there is no dropout or other
//! sampling, so the same input and parameters always give identical output.

pub mod discriminator;
pub mod graph_embedding;
pub mod loss;
pub mod rater;

pub use discriminator::DialogDiscriminator;
pub use graph_embedding::{GraphEmbedding, GRAPH_EMBED_PREFIX};
pub use loss::{HingeLoss, Loss, MultiDimensionAbsLoss};
pub use rater::{DialogRater, RatingHead};

use crate::config::ConfigError;
use crate::embed::{EncoderError, UtteranceEncoder};
use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use dialograph_layers::{named_parameters, parameter_count, LayerError};
use ndarray::Array2;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Encoder produces {got}-dimensional embeddings, model expects {expected}")]
    EncoderMismatch { expected: usize, got: usize },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Batch contains no dialogs")]
    EmptyBatch,
}

pub type ModelResult<T> = Result<T, ModelError>;

/// A trainable model whose parameters live in a [`VarMap`]
pub trait DialogModel: Sized {
    /// Collated batch the model consumes
    type Input;
    /// Hyperparameters; enough to rebuild the model before loading weights
    type Config: Clone + Serialize + DeserializeOwned;

    /// Build with freshly seeded parameters
    fn from_config(config: Self::Config) -> ModelResult<Self>;

    fn config(&self) -> &Self::Config;

    /// Output that stays attached to the parameters for backpropagation
    fn forward(&self, encoder: &dyn UtteranceEncoder, input: &Self::Input) -> ModelResult<Tensor>;

    /// Forward pass detached from the autograd graph
    fn predict(&self, encoder: &dyn UtteranceEncoder, input: &Self::Input) -> ModelResult<Tensor> {
        Ok(self.forward(encoder, input)?.detach())
    }

    fn varmap(&self) -> &VarMap;

    fn device(&self) -> &Device;

    fn graph_embedding(&self) -> &GraphEmbedding;

    fn num_parameters(&self) -> usize {
        parameter_count(self.varmap())
    }

    /// Flattened parameter values by name
    fn parameter_values(&self) -> ModelResult<BTreeMap<String, Vec<f32>>> {
        named_parameters(self.varmap(), "")?
            .into_iter()
            .map(|(name, var)| Ok((name, var.flatten_all()?.to_vec1::<f32>()?)))
            .collect()
    }
}

/// Copy an `N × D` host matrix onto `device`
pub fn array_to_tensor(array: &Array2<f32>, device: &Device) -> ModelResult<Tensor> {
    let values: Vec<f32> = array.iter().copied().collect();
    Ok(Tensor::from_vec(values, array.dim(), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_array_to_tensor_keeps_row_order() {
        let a = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let t = array_to_tensor(&a, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[2, 3]);
        assert_eq!(t.to_vec2::<f32>().unwrap(), vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);

        let transposed = a.t().to_owned();
        let t = array_to_tensor(&transposed, &Device::Cpu).unwrap();
        assert_eq!(t.to_vec2::<f32>().unwrap()[0], vec![1.0, 4.0]);
    }
}
