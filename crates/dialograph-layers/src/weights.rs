//! Dense pairwise edge weights from node embeddings
//!
//! Weights are recomputed on every forward pass; the embeddings they derive
//! from are not stable across training steps.

use crate::common::LayerResult;
use candle_core::Tensor;
use serde::{Deserialize, Serialize};

/// Decay used by the discriminator's graph embedding
pub const DEFAULT_DECAY_FACTOR: f32 = 0.9;

/// Rows with a smaller norm are treated as zero vectors
const NORM_EPSILON: f64 = 1e-12;

/// How node embeddings become edge weights
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeWeightPolicy {
    /// Cosine similarity
    #[default]
    Cosine,
    /// Cosine similarity scaled by `factor^|i - j|`
    DistanceDecay { factor: f32 },
}

impl EdgeWeightPolicy {
    pub fn decayed() -> Self {
        EdgeWeightPolicy::DistanceDecay {
            factor: DEFAULT_DECAY_FACTOR,
        }
    }

    pub fn decay_factor(&self) -> Option<f32> {
        match self {
            EdgeWeightPolicy::Cosine => None,
            EdgeWeightPolicy::DistanceDecay { factor } => Some(*factor),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EdgeWeightBuilder {
    policy: EdgeWeightPolicy,
}

impl EdgeWeightBuilder {
    pub fn new(policy: EdgeWeightPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EdgeWeightPolicy {
        self.policy
    }

    /// N×N weight matrix for N node embeddings, on the device of `x`
    pub fn build(&self, x: &Tensor) -> LayerResult<Tensor> {
        let similarity = cosine_similarity_matrix(x)?;
        match self.policy.decay_factor() {
            Some(factor) => Ok((similarity * decay_matrix(x.dim(0)?, factor, x)?)?),
            None => Ok(similarity),
        }
    }
}

/// Cosine similarity matrix, optionally decayed by index distance
pub fn pairwise_cosine_similarity(x: &Tensor, decay: Option<f32>) -> LayerResult<Tensor> {
    let policy = match decay {
        Some(factor) => EdgeWeightPolicy::DistanceDecay { factor },
        None => EdgeWeightPolicy::Cosine,
    };
    EdgeWeightBuilder::new(policy).build(x)
}

fn cosine_similarity_matrix(x: &Tensor) -> LayerResult<Tensor> {
    let norms = x.sqr()?.sum_keepdim(1)?.sqrt()?.maximum(NORM_EPSILON)?;
    let unit = x.broadcast_div(&norms)?;
    Ok(unit.matmul(&unit.t()?)?)
}

fn decay_matrix(n: usize, factor: f32, like: &Tensor) -> LayerResult<Tensor> {
    let values: Vec<f32> = (0..n)
        .flat_map(|i| (0..n).map(move |j| factor.powi(i.abs_diff(j) as i32)))
        .collect();
    Ok(Tensor::from_vec(values, (n, n), like.device())?.to_dtype(like.dtype())?)
}
