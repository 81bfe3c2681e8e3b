//! Core type definitions for dialog graphs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of discourse relation types used by the default models
pub const DEFAULT_RELATION_COUNT: usize = 9;

/// Discourse relation carried by an edge (e.g. reply-to, same-speaker).
///
/// Relations come from a fixed enumeration of size R and are stored as their
/// index in `[0, R)`; R is a model hyperparameter, so the range is checked
/// when a graph is built rather than here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RelationType(pub u16);

impl RelationType {
    pub fn new(index: u16) -> Self {
        RelationType(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelationType({})", self.0)
    }
}

impl From<u16> for RelationType {
    fn from(index: u16) -> Self {
        RelationType(index)
    }
}

/// One utterance (graph node) in the form the encoder receives it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Utterance {
    /// Raw utterance text
    Text(String),
    /// Padded token ids; 0 is padding
    Tokens(Vec<u32>),
    /// Encoder output computed ahead of time
    Embedding(Vec<f32>),
}

impl Utterance {
    pub fn kind(&self) -> &'static str {
        match self {
            Utterance::Text(_) => "text",
            Utterance::Tokens(_) => "tokens",
            Utterance::Embedding(_) => "embedding",
        }
    }
}

impl From<&str> for Utterance {
    fn from(text: &str) -> Self {
        Utterance::Text(text.to_string())
    }
}

impl From<Vec<f32>> for Utterance {
    fn from(embedding: Vec<f32>) -> Self {
        Utterance::Embedding(embedding)
    }
}

/// Directed, relation-typed edge between two utterances of the same dialog.
/// Messages flow from `source` into `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogEdge {
    pub source: usize,
    pub target: usize,
    pub relation: RelationType,
}

impl DialogEdge {
    pub fn new(source: usize, target: usize, relation: impl Into<RelationType>) -> Self {
        Self {
            source,
            target,
            relation: relation.into(),
        }
    }
}
