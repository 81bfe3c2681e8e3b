//! Multi-dimension dialog rater

use super::graph_embedding::GraphEmbedding;
use super::{DialogModel, ModelResult};
use crate::config::RaterConfig;
use crate::embed::UtteranceEncoder;
use crate::graph::GraphBatch;
use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder, VarMap};
use dialograph_layers::seed_parameters;

/// Feed-forward head mapping a dialog embedding to `n_dims` scores
///
/// With no hidden layers this is a single linear projection; otherwise each
/// hidden layer is a linear map followed by ReLU.
#[derive(Debug, Clone)]
pub struct RatingHead {
    hidden: Vec<Linear>,
    output: Linear,
}

impl RatingHead {
    pub fn new(in_dim: usize, n_hidden: usize, hidden_dim: usize, n_dims: usize, vb: VarBuilder) -> ModelResult<Self> {
        let mut hidden = Vec::with_capacity(n_hidden);
        let mut width = in_dim;
        for i in 0..n_hidden {
            hidden.push(linear(width, hidden_dim, vb.pp("hidden").pp(i))?);
            width = hidden_dim;
        }
        Ok(Self {
            hidden,
            output: linear(width, n_dims, vb.pp("output"))?,
        })
    }

    pub fn n_dims(&self) -> ModelResult<usize> {
        Ok(self.output.weight().dim(0)?)
    }

    pub fn forward(&self, x: &Tensor) -> ModelResult<Tensor> {
        let mut h = x.clone();
        for lin in &self.hidden {
            h = lin.forward(&h)?.relu()?;
        }
        Ok(self.output.forward(&h)?)
    }
}

/// Scores a dialog along `n_dims` quality dimensions
#[derive(Clone)]
pub struct DialogRater {
    config: RaterConfig,
    varmap: VarMap,
    device: Device,
    graph_embed: GraphEmbedding,
    head: RatingHead,
}

// `VarMap` does not implement `Debug`, so it is omitted here.
impl std::fmt::Debug for DialogRater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogRater")
            .field("config", &self.config)
            .field("device", &self.device)
            .field("graph_embed", &self.graph_embed)
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

impl DialogRater {
    pub fn new(config: RaterConfig) -> ModelResult<Self> {
        config.validate()?;
        let device = config.graph.device.resolve()?;
        let varmap = VarMap::new();
        let graph_embed = GraphEmbedding::build(config.graph.clone(), &varmap, &device)?;
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let head = RatingHead::new(
            config.graph.hidden_size,
            config.n_hidden_layers,
            config.hidden_dim,
            config.n_dims,
            vb.pp("head"),
        )?;
        seed_parameters(&varmap, config.graph.seed)?;
        Ok(Self {
            config,
            varmap,
            device,
            graph_embed,
            head,
        })
    }

    pub fn n_dims(&self) -> usize {
        self.config.n_dims
    }

    pub fn head(&self) -> &RatingHead {
        &self.head
    }
}

impl DialogModel for DialogRater {
    type Input = GraphBatch;
    type Config = RaterConfig;

    fn from_config(config: RaterConfig) -> ModelResult<Self> {
        Self::new(config)
    }

    fn config(&self) -> &RaterConfig {
        &self.config
    }

    /// `(num_graphs, n_dims)` scores
    fn forward(&self, encoder: &dyn UtteranceEncoder, input: &GraphBatch) -> ModelResult<Tensor> {
        let embedded = self.graph_embed.forward(encoder, input)?;
        self.head.forward(&embedded)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphEmbeddingConfig;
    use crate::embed::HashingEncoder;
    use crate::graph::{DialogEdge, DialogGraph, Utterance};
    use crate::model::{Loss, MultiDimensionAbsLoss};
    use candle_nn::Optimizer;
    use dialograph_layers::adam;

    fn config(n_hidden_layers: usize) -> RaterConfig {
        RaterConfig {
            graph: GraphEmbeddingConfig {
                n_layers: 2,
                n_relations: 3,
                embed_size: 12,
                hidden_size: 12,
                ..GraphEmbeddingConfig::default()
            },
            n_dims: 4,
            n_hidden_layers,
            hidden_dim: 5,
        }
    }

    fn batch() -> GraphBatch {
        let make = |words: &[&str]| {
            let utterances = words.iter().map(|w| Utterance::from(*w)).collect::<Vec<_>>();
            let edges = (1..utterances.len()).map(|i| DialogEdge::new(i - 1, i, 1u16)).collect();
            DialogGraph::new(utterances, edges, 3).unwrap()
        };
        let graphs = [
            make(&["hello there", "hi how are you", "fine thanks"]),
            make(&["what time is it", "noon", "thank you"]),
        ];
        GraphBatch::from_graphs(&graphs)
    }

    #[test]
    fn test_output_shape() {
        let encoder = HashingEncoder::new(12);
        for hidden in [0, 2] {
            let rater = DialogRater::new(config(hidden)).unwrap();
            let scores = rater.predict(&encoder, &batch()).unwrap();
            assert_eq!(scores.dims(), &[2, 4]);
        }
    }

    #[test]
    fn test_forward_is_deterministic() {
        let encoder = HashingEncoder::new(12);
        let rater = DialogRater::new(config(1)).unwrap();
        let a = rater.predict(&encoder, &batch()).unwrap().to_vec2::<f32>().unwrap();
        let b = rater.predict(&encoder, &batch()).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_graph_embedding_matches_standalone_stack() {
        let rater = DialogRater::new(config(1)).unwrap();
        let standalone = GraphEmbedding::new(config(1).graph).unwrap();
        for (name, var) in standalone.parameters() {
            let ours = &rater.graph_embedding().parameters()[name];
            assert_eq!(
                ours.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
                var.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
                "{name}"
            );
        }
    }

    #[test]
    fn test_optimizer_step_moves_head_and_keeps_config() {
        let encoder = HashingEncoder::new(12);
        let rater = DialogRater::new(config(1)).unwrap();
        let before = rater.parameter_values().unwrap();
        let target = Tensor::ones((2, 4), DType::F32, &Device::Cpu).unwrap();
        let loss = MultiDimensionAbsLoss::new(4)
            .forward(&rater.forward(&encoder, &batch()).unwrap(), &target)
            .unwrap();
        let mut opt = adam(rater.varmap().all_vars(), 0.01).unwrap();
        opt.backward_step(&loss).unwrap();

        let after = rater.parameter_values().unwrap();
        assert_ne!(after["head.output.bias"], before["head.output.bias"]);
        assert_eq!(rater.config(), &config(1));
    }

    #[test]
    fn test_parameter_count_includes_head() {
        let rater = DialogRater::new(config(1)).unwrap();
        // hidden 12→5 and output 5→4
        let head = (12 * 5 + 5) + (5 * 4 + 4);
        assert_eq!(rater.num_parameters(), rater.graph_embedding().num_parameters() + head);
    }

    #[test]
    fn test_parameter_count_does_not_grow_with_rounds() {
        let shallow = DialogRater::new(RaterConfig {
            graph: GraphEmbeddingConfig {
                n_layers: 1,
                ..config(0).graph
            },
            ..config(0)
        })
        .unwrap();
        let deep = DialogRater::new(RaterConfig {
            graph: GraphEmbeddingConfig {
                n_layers: 3,
                ..config(0).graph
            },
            ..config(0)
        })
        .unwrap();
        assert_eq!(shallow.num_parameters(), deep.num_parameters());
    }
}
