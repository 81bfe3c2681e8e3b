//! Dialog graphs: utterances as nodes, typed discourse relations as edges

use super::types::{DialogEdge, Utterance};
use dialograph_layers::EdgeIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Edge {edge}: node {node} does not exist (dialog has {node_count} utterances)")]
    NodeOutOfRange {
        edge: usize,
        node: usize,
        node_count: usize,
    },

    #[error("Edge {edge}: relation {relation} outside [0, {n_relations})")]
    RelationOutOfRange {
        edge: usize,
        relation: usize,
        n_relations: usize,
    },

    #[error("Dialog has no utterances")]
    Empty,

    #[error("Inconsistent graph data: {0}")]
    Inconsistent(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// A dialog as a relation-typed graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogGraph {
    utterances: Vec<Utterance>,
    edges: Vec<DialogEdge>,
}

impl DialogGraph {
    /// Build a graph, checking every edge against the node set and relation range
    pub fn new(utterances: Vec<Utterance>, edges: Vec<DialogEdge>, n_relations: usize) -> GraphResult<Self> {
        let graph = Self { utterances, edges };
        graph.validate(n_relations)?;
        Ok(graph)
    }

    /// Build from parallel arrays as stored by the dataset files
    pub fn from_parts(
        utterances: Vec<Utterance>,
        edge_index: &[(usize, usize)],
        relations: &[u16],
        n_relations: usize,
    ) -> GraphResult<Self> {
        if edge_index.len() != relations.len() {
            return Err(GraphError::Inconsistent(format!(
                "{} edges but {} relation types",
                edge_index.len(),
                relations.len()
            )));
        }
        let edges = edge_index
            .iter()
            .zip(relations)
            .map(|(&(source, target), &relation)| DialogEdge::new(source, target, relation))
            .collect();
        Self::new(utterances, edges, n_relations)
    }

    /// Re-check invariants, e.g. after deserializing
    pub fn validate(&self, n_relations: usize) -> GraphResult<()> {
        if self.utterances.is_empty() {
            return Err(GraphError::Empty);
        }
        let node_count = self.utterances.len();
        for (edge, e) in self.edges.iter().enumerate() {
            for node in [e.source, e.target] {
                if node >= node_count {
                    return Err(GraphError::NodeOutOfRange { edge, node, node_count });
                }
            }
            if e.relation.index() >= n_relations {
                return Err(GraphError::RelationOutOfRange {
                    edge,
                    relation: e.relation.index(),
                    n_relations,
                });
            }
        }
        Ok(())
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn edges(&self) -> &[DialogEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.utterances.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Untyped edge list, shifted by `offset`
    pub fn edge_index(&self, offset: usize) -> EdgeIndex {
        let mut index = EdgeIndex::with_capacity(self.edges.len());
        for e in &self.edges {
            index.push(e.source + offset, e.target + offset);
        }
        index
    }

    /// Relation index per edge, aligned with [`DialogGraph::edge_index`]
    pub fn edge_types(&self) -> Vec<usize> {
        self.edges.iter().map(|e| e.relation.index()).collect()
    }
}
