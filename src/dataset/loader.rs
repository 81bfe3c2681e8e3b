//! Batching records into model inputs

use super::DatasetResult;
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Turns a slice of records into a model input and its target tensor
pub trait Collate: Sized {
    type Batch;

    /// Target is allocated on `device`
    fn collate(records: &[&Self], device: &Device) -> DatasetResult<(Self::Batch, Tensor)>;
}

/// Iterates over a dataset in batches of `batch_size` records
///
/// The last batch may be smaller. Shuffling permutes record order with a
/// seeded RNG, so the same seed yields the same batches.
#[derive(Debug, Clone)]
pub struct DataLoader<'a, R> {
    records: &'a [R],
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
}

impl<'a, R> DataLoader<'a, R> {
    /// `batch_size` of 0 is treated as 1
    pub fn new(records: &'a [R], batch_size: usize) -> Self {
        Self {
            records,
            batch_size: batch_size.max(1),
            order: (0..records.len()).collect(),
            cursor: 0,
        }
    }

    pub fn shuffled(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.order.shuffle(&mut rng);
        self
    }

    pub fn num_batches(&self) -> usize {
        self.records.len().div_ceil(self.batch_size)
    }
}

impl<'a, R: Collate> DataLoader<'a, R> {
    /// Collate every remaining batch
    pub fn collated(self, device: &'a Device) -> impl Iterator<Item = DatasetResult<(R::Batch, Tensor)>> + 'a {
        self.map(move |records| R::collate(&records, device))
    }
}

impl<'a, R> Iterator for DataLoader<'a, R> {
    type Item = Vec<&'a R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.order[self.cursor..end].iter().map(|&i| &self.records[i]).collect();
        self.cursor = end;
        Some(batch)
    }
}
