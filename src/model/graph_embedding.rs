//! Graph embedding stack
//!
//! Encodes every utterance of a flattened batch, builds one dense edge-weight
//! matrix over the whole batch, runs the configured propagation rounds and
//! mean-pools nodes back into one vector per dialog. Weights between nodes of
//! different dialogs are computed but never read, since batched edges never
//! cross dialog boundaries.
//!
//! Every round reuses the same relation-aware and self-aware layer, so the
//! parameter count does not grow with `n_layers`.

use super::{array_to_tensor, ModelError, ModelResult};
use crate::config::GraphEmbeddingConfig;
use crate::embed::UtteranceEncoder;
use crate::graph::GraphBatch;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use dialograph_layers::{
    assign_parameters, named_parameters, seed_parameters, segment_mean, EdgeWeightBuilder, RelationAwareLayer,
    SelfAwareLayer,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Name prefix of graph embedding parameters inside a model's store
pub const GRAPH_EMBED_PREFIX: &str = "graph_embed";

#[derive(Debug, Clone)]
pub struct GraphEmbedding {
    config: GraphEmbeddingConfig,
    relation: RelationAwareLayer,
    self_aware: SelfAwareLayer,
    edge_weights: EdgeWeightBuilder,
    device: Device,
    parameters: BTreeMap<String, Var>,
}

impl GraphEmbedding {
    /// Standalone stack with its own parameter store, seeded from `config.seed`
    pub fn new(config: GraphEmbeddingConfig) -> ModelResult<Self> {
        let varmap = VarMap::new();
        let device = config.device.resolve()?;
        let model = Self::build(config, &varmap, &device)?;
        seed_parameters(&varmap, model.config.seed)?;
        Ok(model)
    }

    /// Register the stack's parameters under [`GRAPH_EMBED_PREFIX`] in `varmap`.
    ///
    /// Parameters keep their builder initialisation; the owning model seeds
    /// the whole store once every part is registered.
    pub fn build(config: GraphEmbeddingConfig, varmap: &VarMap, device: &Device) -> ModelResult<Self> {
        config.validate()?;
        let vb = VarBuilder::from_varmap(varmap, DType::F32, device).pp(GRAPH_EMBED_PREFIX);
        let relation = RelationAwareLayer::new(
            config.n_relations,
            config.embed_size,
            config.hidden_size,
            vb.pp("relation"),
        )?;
        let self_aware = SelfAwareLayer::new(config.hidden_size, config.hidden_size, vb.pp("self_aware"))?;
        let parameters = named_parameters(varmap, &format!("{GRAPH_EMBED_PREFIX}."))?;
        Ok(Self {
            edge_weights: EdgeWeightBuilder::new(config.edge_weights),
            config,
            relation,
            self_aware,
            device: device.clone(),
            parameters,
        })
    }

    pub fn config(&self) -> &GraphEmbeddingConfig {
        &self.config
    }

    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    pub fn embed_size(&self) -> usize {
        self.config.embed_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Parameters of this stack by full name
    pub fn parameters(&self) -> &BTreeMap<String, Var> {
        &self.parameters
    }

    /// Run the encoder over every utterance of the batch
    pub fn encode_nodes(&self, encoder: &dyn UtteranceEncoder, batch: &GraphBatch) -> ModelResult<Tensor> {
        if encoder.embed_size() != self.config.embed_size {
            return Err(ModelError::EncoderMismatch {
                expected: self.config.embed_size,
                got: encoder.embed_size(),
            });
        }
        array_to_tensor(&encoder.encode(&batch.utterances)?, &self.device)
    }

    /// Node features after all propagation rounds, before pooling
    pub fn propagate(&self, nodes: &Tensor, batch: &GraphBatch) -> ModelResult<Tensor> {
        let weights = self.edge_weights.build(nodes)?;
        let mut x = nodes.clone();
        for _ in 0..self.config.n_layers {
            x = self
                .relation
                .forward(&x, &batch.edge_index, &batch.edge_types, &weights)?;
            x = self.self_aware.forward(&x, &batch.edge_index)?;
        }
        Ok(x)
    }

    /// One `hidden_size` vector per dialog in the batch
    pub fn forward(&self, encoder: &dyn UtteranceEncoder, batch: &GraphBatch) -> ModelResult<Tensor> {
        if batch.num_graphs == 0 {
            return Err(ModelError::EmptyBatch);
        }
        debug!(
            "Embedding {} dialogs ({} nodes, {} edges)",
            batch.num_graphs,
            batch.node_count(),
            batch.edge_index.len()
        );

        let nodes = self.encode_nodes(encoder, batch)?;
        let x = self.propagate(&nodes, batch)?;
        Ok(segment_mean(&x, &batch.node_graph, batch.num_graphs)?)
    }

    /// Overwrite this stack's parameters with `other`'s, keeping this stack's
    /// edge weighting, round count and device
    pub fn copy_parameters_from(&self, other: &GraphEmbedding) -> ModelResult<()> {
        let (ours, theirs) = (&self.config, &other.config);
        let shape = |c: &GraphEmbeddingConfig| (c.n_relations, c.embed_size, c.hidden_size);
        if shape(ours) != shape(theirs) {
            return Err(ModelError::ShapeMismatch(format!(
                "graph embedding (relations, embed, hidden) {:?} cannot take parameters from {:?}",
                shape(ours),
                shape(theirs)
            )));
        }
        let source: HashMap<String, Tensor> = other
            .parameters
            .iter()
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect();
        assign_parameters(&self.parameters, &source)?;
        Ok(())
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.values().map(|v| v.elem_count()).sum()
    }
}
