//! Datasets, collation and batching
//!
//! Raw collaborator files are processed once into cached train/test splits.
//! Splits are positional: the first `floor(0.8·N)` examples train, the rest
//! test, without shuffling beforehand.

pub mod discrimination;
pub mod loader;
pub mod rating;
pub mod stats;

pub use discrimination::{DiscriminationDataset, PairRecord, PAIRS_FILE};
pub use loader::{Collate, DataLoader};
pub use rating::{RatingDataset, RatingRecord, RawRatingData};
pub use stats::LabelStats;

use crate::graph::GraphError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Fraction of examples in the training split
pub const TRAIN_FRACTION: f64 = 0.8;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Example {index}: {source}")]
    Graph {
        index: usize,
        #[source]
        source: GraphError,
    },

    #[error("Inconsistent dataset: {0}")]
    Inconsistent(String),

    #[error("Example {index}: target {value} is not -1 or +1")]
    InvalidTarget { index: usize, value: f32 },

    #[error("Dataset is empty")]
    Empty,

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of the first test example for `len` examples
pub fn split_index(len: usize) -> usize {
    (TRAIN_FRACTION * len as f64).floor() as usize
}

/// Split positionally into train and test halves
pub fn split_at_ratio<T>(mut items: Vec<T>) -> (Vec<T>, Vec<T>) {
    let test = items.split_off(split_index(items.len()));
    (items, test)
}

pub(crate) fn read_bincode<T: DeserializeOwned>(path: &Path) -> DatasetResult<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

pub(crate) fn write_bincode<T: Serialize>(path: &Path, value: &T) -> DatasetResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_index_floors() {
        assert_eq!(split_index(10), 8);
        assert_eq!(split_index(7), 5);
        assert_eq!(split_index(1), 0);
        assert_eq!(split_index(0), 0);
    }

    #[test]
    fn test_split_keeps_order() {
        let (train, test) = split_at_ratio((0..10).collect::<Vec<_>>());
        assert_eq!(train, (0..8).collect::<Vec<_>>());
        assert_eq!(test, vec![8, 9]);
    }

    #[test]
    fn test_bincode_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/values.bin");
        write_bincode(&path, &vec![1.5f32, -2.0]).unwrap();
        let back: Vec<f32> = read_bincode(&path).unwrap();
        assert_eq!(back, vec![1.5, -2.0]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_bincode::<Vec<f32>>(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, DatasetError::Io(_)));
    }
}
