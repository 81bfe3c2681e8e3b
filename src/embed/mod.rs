//! Utterance encoders
//!
//! The graph models only see an encoder through [`UtteranceEncoder`]: a
//! function from utterances to one fixed-size vector each. Pretrained
//! transformer encoders plug in here; the crate ships two lightweight ones.

pub mod hashing;
pub mod precomputed;

pub use hashing::HashingEncoder;
pub use precomputed::PrecomputedEncoder;

use crate::graph::Utterance;
use ndarray::Array2;
use thiserror::Error;

/// Encoder errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncoderError {
    /// The encoder cannot consume this kind of utterance
    #[error("{encoder} encoder cannot encode {kind} utterance {index}")]
    UnsupportedUtterance {
        encoder: &'static str,
        kind: &'static str,
        index: usize,
    },

    /// Precomputed embedding of the wrong width
    #[error("Utterance {index}: expected embedding of size {expected}, got {got}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },

    /// Encoder configured with no output dimensions
    #[error("{0} encoder needs at least one output dimension")]
    ZeroWidth(&'static str),
}

pub type EncoderResult<T> = Result<T, EncoderError>;

/// Maps utterances to an `N × embed_size` matrix, one row per utterance
pub trait UtteranceEncoder: Send + Sync {
    fn embed_size(&self) -> usize;

    fn encode(&self, utterances: &[Utterance]) -> EncoderResult<Array2<f32>>;

    fn name(&self) -> &'static str;
}

/// Copy a precomputed embedding into `row`, checking its width
pub(crate) fn copy_embedding(
    mut row: ndarray::ArrayViewMut1<f32>,
    embedding: &[f32],
    index: usize,
) -> EncoderResult<()> {
    if embedding.len() != row.len() {
        return Err(EncoderError::DimensionMismatch {
            index,
            expected: row.len(),
            got: embedding.len(),
        });
    }
    row.iter_mut().zip(embedding).for_each(|(dst, &src)| *dst = src);
    Ok(())
}
