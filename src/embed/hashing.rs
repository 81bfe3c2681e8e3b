//! Signed feature-hashing encoder
//!
//! A deterministic, parameter-free stand-in for a sentence transformer:
//! every token is hashed into one of `dim` buckets with a ±1 sign and the
//! resulting vector is L2-normalized. Good enough for smoke runs and tests
//! where no pretrained encoder is available.

use super::{copy_embedding, EncoderError, EncoderResult, UtteranceEncoder};
use crate::graph::Utterance;
use ndarray::{Array2, ArrayViewMut1};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Token id used for padding in pre-tokenized utterances
pub const PAD_TOKEN: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEncoder {
    dim: usize,
    seed: u64,
}

impl HashingEncoder {
    pub fn new(dim: usize) -> Self {
        Self::with_seed(dim, 0)
    }

    pub fn with_seed(dim: usize, seed: u64) -> Self {
        Self { dim, seed }
    }

    fn bucket<T: Hash>(&self, token: T) -> (usize, f32) {
        let mut hasher = FxHasher::default();
        self.seed.hash(&mut hasher);
        token.hash(&mut hasher);
        let h = hasher.finish();
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        ((h % self.dim as u64) as usize, sign)
    }

    fn encode_text(&self, text: &str, row: &mut ArrayViewMut1<f32>) {
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let (bucket, sign) = self.bucket(word);
            row[bucket] += sign;
        }
    }

    fn encode_tokens(&self, tokens: &[u32], row: &mut ArrayViewMut1<f32>) {
        for &token in tokens.iter().filter(|&&t| t != PAD_TOKEN) {
            let (bucket, sign) = self.bucket(token);
            row[bucket] += sign;
        }
    }
}

fn l2_normalize(row: &mut ArrayViewMut1<f32>) {
    let magnitude = row.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        row.mapv_inplace(|v| v / magnitude);
    }
}

impl UtteranceEncoder for HashingEncoder {
    fn embed_size(&self) -> usize {
        self.dim
    }

    fn encode(&self, utterances: &[Utterance]) -> EncoderResult<Array2<f32>> {
        if self.dim == 0 {
            return Err(EncoderError::ZeroWidth(self.name()));
        }
        let mut out = Array2::zeros((utterances.len(), self.dim));
        for (index, (utterance, mut row)) in utterances.iter().zip(out.rows_mut()).enumerate() {
            match utterance {
                Utterance::Text(text) => {
                    self.encode_text(text, &mut row);
                    l2_normalize(&mut row);
                }
                Utterance::Tokens(tokens) => {
                    self.encode_tokens(tokens, &mut row);
                    l2_normalize(&mut row);
                }
                Utterance::Embedding(embedding) => copy_embedding(row, embedding, index)?,
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "hashing"
    }
}
