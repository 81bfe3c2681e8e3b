//! Shared types for the message-passing layers
//!
//! Edges are stored in coordinate form and always flow source → target:
//! the message built from `x[source]` is accumulated into row `target`.

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Layer errors
#[derive(Error, Debug)]
pub enum LayerError {
    /// Feature width does not match the layer
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Edge endpoint outside the node set
    #[error("Edge {edge} references node {node} but only {node_count} nodes exist")]
    NodeOutOfRange {
        edge: usize,
        node: usize,
        node_count: usize,
    },

    /// Pooling assignment points at a graph that is not in the batch
    #[error("Node {node} is assigned to graph {graph} but the batch has {num_graphs} graphs")]
    GraphOutOfRange {
        node: usize,
        graph: usize,
        num_graphs: usize,
    },

    /// Relation id outside [0, n_relations)
    #[error("Edge {edge} has relation {relation}, layer supports {n_relations}")]
    RelationOutOfRange {
        edge: usize,
        relation: usize,
        n_relations: usize,
    },

    /// One relation type per edge is required
    #[error("Got {types} edge types for {edges} edges")]
    EdgeTypeCount { types: usize, edges: usize },

    /// Edge weight matrix is not N×N
    #[error("Edge weight matrix is {rows}x{cols}, expected {expected}x{expected}")]
    WeightShape {
        rows: usize,
        cols: usize,
        expected: usize,
    },

    /// A pooled graph has no nodes
    #[error("Graph {0} has no nodes to pool")]
    EmptySegment(usize),

    /// Parameter missing from a store, or stored with another shape
    #[error("Parameter {name}: {reason}")]
    Parameter { name: String, reason: String },

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type LayerResult<T> = Result<T, LayerError>;

/// Where tensors are allocated.
///
/// `Cuda` falls back to the CPU when candle was built without a CUDA backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeDevice {
    #[default]
    Cpu,
    /// GPU ordinal
    Cuda(usize),
}

impl ComputeDevice {
    pub fn resolve(&self) -> LayerResult<Device> {
        match self {
            ComputeDevice::Cpu => Ok(Device::Cpu),
            ComputeDevice::Cuda(ordinal) => Ok(Device::cuda_if_available(*ordinal)?),
        }
    }
}

/// Directed edge list in coordinate (COO) form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeIndex {
    /// Message senders
    pub sources: Vec<usize>,
    /// Message receivers, aligned with `sources`
    pub targets: Vec<usize>,
}

impl EdgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sources: Vec::with_capacity(capacity),
            targets: Vec::with_capacity(capacity),
        }
    }

    /// Build from `(source, target)` pairs
    pub fn from_pairs(pairs: &[(usize, usize)]) -> Self {
        let mut index = Self::with_capacity(pairs.len());
        for &(source, target) in pairs {
            index.push(source, target);
        }
        index
    }

    pub fn push(&mut self, source: usize, target: usize) {
        self.sources.push(source);
        self.targets.push(target);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Iterate `(source, target)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sources.iter().copied().zip(self.targets.iter().copied())
    }

    /// Check every endpoint against the node count
    pub fn validate(&self, node_count: usize) -> LayerResult<()> {
        for (edge, (source, target)) in self.iter().enumerate() {
            for node in [source, target] {
                if node >= node_count {
                    return Err(LayerError::NodeOutOfRange {
                        edge,
                        node,
                        node_count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of edges arriving at each node
    pub fn in_degrees(&self, node_count: usize) -> Vec<usize> {
        let mut degrees = vec![0; node_count];
        for &target in &self.targets {
            if target < node_count {
                degrees[target] += 1;
            }
        }
        degrees
    }

    /// `(sources, targets)` as `u32` index tensors
    pub fn to_tensors(&self, device: &Device) -> LayerResult<(Tensor, Tensor)> {
        Ok((index_tensor(&self.sources, device)?, index_tensor(&self.targets, device)?))
    }
}

/// Row ids as a 1-D `u32` tensor for `index_select` / `index_add`
pub fn index_tensor(ids: &[usize], device: &Device) -> LayerResult<Tensor> {
    let ids: Vec<u32> = ids.iter().map(|&i| i as u32).collect();
    let len = ids.len();
    Ok(Tensor::from_vec(ids, len, device)?)
}

pub(crate) fn check_width(x: &Tensor, expected: usize) -> LayerResult<()> {
    let got = x.dim(1)?;
    if got != expected {
        return Err(LayerError::DimensionMismatch { expected, got });
    }
    Ok(())
}
