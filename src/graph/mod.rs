//! Dialog graph data model
//!
//! - Utterances are nodes, carried as text, token ids or precomputed embeddings
//! - Directed edges carry one relation type from a fixed enumeration
//! - Batches are disjoint unions with offset-adjusted edges

pub mod batch;
pub mod dialog;
pub mod types;

pub use batch::{GraphBatch, PairBatch};
pub use dialog::{DialogGraph, GraphError, GraphResult};
pub use types::{DialogEdge, RelationType, Utterance, DEFAULT_RELATION_COUNT};
