//! Identity encoder over stored encoder outputs

use super::{copy_embedding, EncoderError, EncoderResult, UtteranceEncoder};
use crate::graph::Utterance;
use ndarray::Array2;

/// Stacks [`Utterance::Embedding`] rows as-is.
///
/// Used by the rating pipeline, whose dataset already holds the sentence
/// encoder's output for every utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecomputedEncoder {
    dim: usize,
}

impl PrecomputedEncoder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl UtteranceEncoder for PrecomputedEncoder {
    fn embed_size(&self) -> usize {
        self.dim
    }

    fn encode(&self, utterances: &[Utterance]) -> EncoderResult<Array2<f32>> {
        let mut out = Array2::zeros((utterances.len(), self.dim));
        for (index, (utterance, row)) in utterances.iter().zip(out.rows_mut()).enumerate() {
            match utterance {
                Utterance::Embedding(embedding) => copy_embedding(row, embedding, index)?,
                other => {
                    return Err(EncoderError::UnsupportedUtterance {
                        encoder: self.name(),
                        kind: other.kind(),
                        index,
                    })
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "precomputed"
    }
}
