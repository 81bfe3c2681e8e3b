//! Rating dataset: dialogs with multi-dimension quality labels

use super::loader::Collate;
use super::stats::LabelStats;
use super::{read_bincode, split_at_ratio, write_bincode, DatasetError, DatasetResult, Split};
use crate::graph::{DialogGraph, GraphBatch, Utterance};
use candle_core::{Device, Tensor};
use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const NODES_FILE: &str = "nodes.bin";
pub const EDGE_INDEX_FILE: &str = "edge_idxs.bin";
pub const EDGE_TYPES_FILE: &str = "edges.bin";
pub const LABELS_FILE: &str = "labels.bin";
pub const PROCESSED_TRAIN_FILE: &str = "processed_train.bin";
pub const PROCESSED_TEST_FILE: &str = "processed_test.bin";

/// The four parallel per-dialog files produced upstream
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRatingData {
    /// Node embeddings, one vector per utterance
    pub nodes: Vec<Vec<Vec<f32>>>,
    /// `(source, target)` pairs
    pub edge_idxs: Vec<Vec<(usize, usize)>>,
    /// Relation type of each edge
    pub edges: Vec<Vec<u16>>,
    pub labels: Vec<Vec<f32>>,
}

impl RawRatingData {
    pub fn load(root: impl AsRef<Path>) -> DatasetResult<Self> {
        let root = root.as_ref();
        Ok(Self {
            nodes: read_bincode(&root.join(NODES_FILE))?,
            edge_idxs: read_bincode(&root.join(EDGE_INDEX_FILE))?,
            edges: read_bincode(&root.join(EDGE_TYPES_FILE))?,
            labels: read_bincode(&root.join(LABELS_FILE))?,
        })
    }

    pub fn save(&self, root: impl AsRef<Path>) -> DatasetResult<()> {
        let root = root.as_ref();
        write_bincode(&root.join(NODES_FILE), &self.nodes)?;
        write_bincode(&root.join(EDGE_INDEX_FILE), &self.edge_idxs)?;
        write_bincode(&root.join(EDGE_TYPES_FILE), &self.edges)?;
        write_bincode(&root.join(LABELS_FILE), &self.labels)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn check_lengths(&self) -> DatasetResult<()> {
        let n = self.nodes.len();
        if self.edge_idxs.len() != n || self.edges.len() != n || self.labels.len() != n {
            return Err(DatasetError::Inconsistent(format!(
                "{} node lists, {} edge indices, {} edge type lists, {} labels",
                n,
                self.edge_idxs.len(),
                self.edges.len(),
                self.labels.len()
            )));
        }
        if n == 0 {
            return Err(DatasetError::Empty);
        }
        Ok(())
    }
}

/// One dialog with its normalised label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub graph: DialogGraph,
    pub label: Array1<f32>,
}

impl Collate for RatingRecord {
    type Batch = GraphBatch;

    /// Labels stacked into `(records, dims)`
    fn collate(records: &[&Self], device: &Device) -> DatasetResult<(GraphBatch, Tensor)> {
        let Some(first) = records.first() else {
            return Err(DatasetError::Empty);
        };
        let width = first.label.len();
        let mut labels = Vec::with_capacity(records.len() * width);
        for (i, record) in records.iter().enumerate() {
            if record.label.len() != width {
                return Err(DatasetError::Inconsistent(format!(
                    "batch record {} has {} label dims, expected {}",
                    i,
                    record.label.len(),
                    width
                )));
            }
            labels.extend(record.label.iter().copied());
        }
        let batch = GraphBatch::from_graphs(records.iter().map(|r| &r.graph));
        let target = Tensor::from_vec(labels, (records.len(), width), device)?;
        Ok((batch, target))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProcessedSplit {
    stats: LabelStats,
    records: Vec<RatingRecord>,
}

#[derive(Debug, Clone)]
pub struct RatingDataset {
    split: Split,
    stats: LabelStats,
    records: Vec<RatingRecord>,
}

impl RatingDataset {
    pub fn processed_path(root: &Path, split: Split) -> PathBuf {
        match split {
            Split::Train => root.join(PROCESSED_TRAIN_FILE),
            Split::Test => root.join(PROCESSED_TEST_FILE),
        }
    }

    /// Load one split, processing the raw files first if either cache is missing
    pub fn open(root: impl AsRef<Path>, split: Split, n_relations: usize) -> DatasetResult<Self> {
        let root = root.as_ref();
        let cached = [Split::Train, Split::Test]
            .iter()
            .all(|&s| Self::processed_path(root, s).exists());
        if !cached {
            Self::process(root, n_relations)?;
        }

        let processed: ProcessedSplit = read_bincode(&Self::processed_path(root, split))?;
        info!(
            "Loaded {} split of {:?}: {} dialogs",
            split,
            root,
            processed.records.len()
        );
        Ok(Self {
            split,
            stats: processed.stats,
            records: processed.records,
        })
    }

    /// Normalise labels, build graphs and write both split caches
    pub fn process(root: impl AsRef<Path>, n_relations: usize) -> DatasetResult<LabelStats> {
        let root = root.as_ref();
        let raw = RawRatingData::load(root)?;
        raw.check_lengths()?;
        let stats = LabelStats::compute(&raw.labels)?;

        let records = (0..raw.len())
            .into_par_iter()
            .map(|i| {
                let utterances = raw.nodes[i].iter().cloned().map(Utterance::Embedding).collect();
                let graph = DialogGraph::from_parts(utterances, &raw.edge_idxs[i], &raw.edges[i], n_relations)
                    .map_err(|source| DatasetError::Graph { index: i, source })?;
                let label = stats.normalize(ArrayView1::from(raw.labels[i].as_slice()));
                Ok(RatingRecord { graph, label })
            })
            .collect::<DatasetResult<Vec<_>>>()?;

        let (train, test) = split_at_ratio(records);
        info!(
            "Processed {} dialogs into {} train / {} test",
            raw.len(),
            train.len(),
            test.len()
        );
        for (split, records) in [(Split::Train, train), (Split::Test, test)] {
            let processed = ProcessedSplit {
                stats: stats.clone(),
                records,
            };
            write_bincode(&Self::processed_path(root, split), &processed)?;
        }
        Ok(stats)
    }

    /// Keep at most the first `n` records
    pub fn take(mut self, n: usize) -> Self {
        self.records.truncate(n);
        self
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn stats(&self) -> &LabelStats {
        &self.stats
    }

    pub fn records(&self) -> &[RatingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
