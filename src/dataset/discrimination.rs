//! Discrimination dataset: pairs of dialogs with a ±1 preference target

use super::loader::Collate;
use super::{read_bincode, split_at_ratio, write_bincode, DatasetError, DatasetResult, Split};
use crate::graph::{DialogGraph, GraphBatch, PairBatch};
use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PAIRS_FILE: &str = "pairs.json";
pub const PROCESSED_PAIRS_TRAIN_FILE: &str = "processed_pairs_train.bin";
pub const PROCESSED_PAIRS_TEST_FILE: &str = "processed_pairs_test.bin";

/// Two dialogs and which of them is preferred: +1 for `first`, −1 for `second`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub first: DialogGraph,
    pub second: DialogGraph,
    pub target: f32,
}

impl PairRecord {
    fn validate(&self, index: usize, n_relations: usize) -> DatasetResult<()> {
        if self.target != 1.0 && self.target != -1.0 {
            return Err(DatasetError::InvalidTarget {
                index,
                value: self.target,
            });
        }
        for graph in [&self.first, &self.second] {
            graph
                .validate(n_relations)
                .map_err(|source| DatasetError::Graph { index, source })?;
        }
        Ok(())
    }
}

impl Collate for PairRecord {
    type Batch = PairBatch;

    /// Targets as a `(pairs,)` vector
    fn collate(records: &[&Self], device: &Device) -> DatasetResult<(PairBatch, Tensor)> {
        if records.is_empty() {
            return Err(DatasetError::Empty);
        }
        let batch = PairBatch {
            first: GraphBatch::from_graphs(records.iter().map(|r| &r.first)),
            second: GraphBatch::from_graphs(records.iter().map(|r| &r.second)),
        };
        let targets: Vec<f32> = records.iter().map(|r| r.target).collect();
        let target = Tensor::from_vec(targets, records.len(), device)?;
        Ok((batch, target))
    }
}

#[derive(Debug, Clone)]
pub struct DiscriminationDataset {
    split: Split,
    records: Vec<PairRecord>,
}

impl DiscriminationDataset {
    pub fn processed_path(root: &Path, split: Split) -> PathBuf {
        match split {
            Split::Train => root.join(PROCESSED_PAIRS_TRAIN_FILE),
            Split::Test => root.join(PROCESSED_PAIRS_TEST_FILE),
        }
    }

    pub fn open(root: impl AsRef<Path>, split: Split, n_relations: usize) -> DatasetResult<Self> {
        let root = root.as_ref();
        let cached = [Split::Train, Split::Test]
            .iter()
            .all(|&s| Self::processed_path(root, s).exists());
        if !cached {
            Self::process(root, n_relations)?;
        }

        let records: Vec<PairRecord> = read_bincode(&Self::processed_path(root, split))?;
        info!("Loaded {} split of {:?}: {} dialog pairs", split, root, records.len());
        Ok(Self { split, records })
    }

    /// Validate `pairs.json` and write both split caches; returns the pair count
    pub fn process(root: impl AsRef<Path>, n_relations: usize) -> DatasetResult<usize> {
        let root = root.as_ref();
        let reader = BufReader::new(File::open(root.join(PAIRS_FILE))?);
        let records: Vec<PairRecord> = serde_json::from_reader(reader)?;
        if records.is_empty() {
            return Err(DatasetError::Empty);
        }
        for (index, record) in records.iter().enumerate() {
            record.validate(index, n_relations)?;
        }

        let total = records.len();
        let (train, test) = split_at_ratio(records);
        info!("Processed {} dialog pairs into {} train / {} test", total, train.len(), test.len());
        write_bincode(&Self::processed_path(root, Split::Train), &train)?;
        write_bincode(&Self::processed_path(root, Split::Test), &test)?;
        Ok(total)
    }

    pub fn take(mut self, n: usize) -> Self {
        self.records.truncate(n);
        self
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn records(&self) -> &[PairRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DialogEdge, Utterance};

    fn graph(text: &str) -> DialogGraph {
        DialogGraph::new(
            vec![Utterance::from(text), Utterance::from("reply")],
            vec![DialogEdge::new(0, 1, 3u16)],
            9,
        )
        .unwrap()
    }

    fn write_pairs(root: &Path, records: &[PairRecord]) {
        std::fs::write(root.join(PAIRS_FILE), serde_json::to_string(records).unwrap()).unwrap();
    }

    fn pairs(n: usize) -> Vec<PairRecord> {
        (0..n)
            .map(|i| PairRecord {
                first: graph(&format!("first {i}")),
                second: graph(&format!("second {i}")),
                target: if i % 2 == 0 { 1.0 } else { -1.0 },
            })
            .collect()
    }

    #[test]
    fn test_open_splits_pairs() {
        let dir = tempfile::tempdir().unwrap();
        write_pairs(dir.path(), &pairs(5));
        let train = DiscriminationDataset::open(dir.path(), Split::Train, 9).unwrap();
        let test = DiscriminationDataset::open(dir.path(), Split::Test, 9).unwrap();
        assert_eq!((train.len(), test.len()), (4, 1));
        assert_eq!(test.records()[0].first, graph("first 4"));
    }

    #[test]
    fn test_rejects_non_unit_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = pairs(3);
        records[1].target = 0.5;
        write_pairs(dir.path(), &records);
        assert!(matches!(
            DiscriminationDataset::process(dir.path(), 9),
            Err(DatasetError::InvalidTarget { index: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_relation() {
        let dir = tempfile::tempdir().unwrap();
        write_pairs(dir.path(), &pairs(2));
        assert!(matches!(
            DiscriminationDataset::process(dir.path(), 2),
            Err(DatasetError::Graph { index: 0, .. })
        ));
    }

    #[test]
    fn test_collate_pairs() {
        let records = pairs(3);
        let refs: Vec<&PairRecord> = records.iter().collect();
        let (batch, target) = PairRecord::collate(&refs, &Device::Cpu).unwrap();
        assert_eq!(batch.num_pairs(), 3);
        assert_eq!(batch.first.node_count(), 6);
        assert_eq!(target.to_vec1::<f32>().unwrap(), vec![1.0, -1.0, 1.0]);
    }
}
