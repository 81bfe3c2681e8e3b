//! Pairwise dialog discriminator
//!
//! Both dialogs of a pair go through the same graph embedding stack. The
//! two pooled vectors are concatenated and projected to a single score,
//! trained with [`HingeLoss`](super::HingeLoss) against ±1 targets.

use super::graph_embedding::GraphEmbedding;
use super::{DialogModel, ModelError, ModelResult};
use crate::config::DiscriminatorConfig;
use crate::embed::UtteranceEncoder;
use crate::graph::PairBatch;
use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};
use dialograph_layers::seed_parameters;

#[derive(Clone)]
pub struct DialogDiscriminator {
    config: DiscriminatorConfig,
    varmap: VarMap,
    device: Device,
    graph_embed: GraphEmbedding,
    lin: Linear,
}

// `VarMap` does not implement `Debug`, so it is omitted here.
impl std::fmt::Debug for DialogDiscriminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogDiscriminator")
            .field("config", &self.config)
            .field("device", &self.device)
            .field("graph_embed", &self.graph_embed)
            .field("lin", &self.lin)
            .finish_non_exhaustive()
    }
}

impl DialogDiscriminator {
    pub fn new(config: DiscriminatorConfig) -> ModelResult<Self> {
        config.validate()?;
        let device = config.graph.device.resolve()?;
        let varmap = VarMap::new();
        let graph_embed = GraphEmbedding::build(config.graph.clone(), &varmap, &device)?;
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let lin = linear(2 * config.graph.hidden_size, 1, vb.pp("lin"))?;
        seed_parameters(&varmap, config.graph.seed)?;
        Ok(Self {
            config,
            varmap,
            device,
            graph_embed,
            lin,
        })
    }
}

impl DialogModel for DialogDiscriminator {
    type Input = PairBatch;
    type Config = DiscriminatorConfig;

    fn from_config(config: DiscriminatorConfig) -> ModelResult<Self> {
        Self::new(config)
    }

    fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }

    /// One score per pair, shape `(num_pairs,)`
    fn forward(&self, encoder: &dyn UtteranceEncoder, input: &PairBatch) -> ModelResult<Tensor> {
        if input.first.num_graphs != input.second.num_graphs {
            return Err(ModelError::ShapeMismatch(format!(
                "pair batch has {} first and {} second dialogs",
                input.first.num_graphs, input.second.num_graphs
            )));
        }
        let e1 = self.graph_embed.forward(encoder, &input.first)?;
        let e2 = self.graph_embed.forward(encoder, &input.second)?;
        let joined = Tensor::cat(&[&e1, &e2], 1)?;
        Ok(self.lin.forward(&joined)?.squeeze(1)?)
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn graph_embedding(&self) -> &GraphEmbedding {
        &self.graph_embed
    }
}
