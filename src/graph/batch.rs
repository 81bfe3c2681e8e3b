//! Disjoint-union batching of dialog graphs

use super::dialog::DialogGraph;
use super::types::Utterance;
use dialograph_layers::EdgeIndex;

/// Several dialogs flattened into one graph.
///
/// Node ids of graph `k` are shifted by the node count of graphs `0..k`, so
/// edges never cross graph boundaries. `node_graph[n]` is the graph a
/// flattened node belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBatch {
    pub utterances: Vec<Utterance>,
    pub edge_index: EdgeIndex,
    pub edge_types: Vec<usize>,
    pub node_graph: Vec<usize>,
    pub num_graphs: usize,
}

impl GraphBatch {
    pub fn from_graphs<'a, I>(graphs: I) -> Self
    where
        I: IntoIterator<Item = &'a DialogGraph>,
    {
        let mut batch = GraphBatch {
            utterances: Vec::new(),
            edge_index: EdgeIndex::new(),
            edge_types: Vec::new(),
            node_graph: Vec::new(),
            num_graphs: 0,
        };

        for graph in graphs {
            let offset = batch.utterances.len();
            let edges = graph.edge_index(offset);
            batch.edge_index.sources.extend(edges.sources);
            batch.edge_index.targets.extend(edges.targets);
            batch.edge_types.extend(graph.edge_types());
            batch.utterances.extend(graph.utterances().iter().cloned());
            batch.node_graph.extend(std::iter::repeat(batch.num_graphs).take(graph.node_count()));
            batch.num_graphs += 1;
        }

        batch
    }

    pub fn node_count(&self) -> usize {
        self.utterances.len()
    }

    /// Nodes per graph, in batch order
    pub fn graph_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.num_graphs];
        for &graph in &self.node_graph {
            sizes[graph] += 1;
        }
        sizes
    }

    /// True when every graph has the same node count
    pub fn is_uniform(&self) -> bool {
        let sizes = self.graph_sizes();
        sizes.windows(2).all(|w| w[0] == w[1])
    }
}

/// Two aligned batches scored against each other by the discriminator
#[derive(Debug, Clone, PartialEq)]
pub struct PairBatch {
    pub first: GraphBatch,
    pub second: GraphBatch,
}

impl PairBatch {
    pub fn num_pairs(&self) -> usize {
        self.first.num_graphs
    }
}
