//! Neighbor aggregation with an additive self-transform
//!
//! `y[t] = ReLU(Σ_{s → t} Lin(x[s]) + SelfLin(x[t]))`. The self term is a
//! separate transform added after aggregation, so every node keeps its own
//! signal whether or not the graph carries self-loops.

use crate::common::{check_width, EdgeIndex, LayerResult};
use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};

#[derive(Debug, Clone)]
pub struct SelfAwareLayer {
    lin: Linear,
    self_lin: Linear,
}

impl SelfAwareLayer {
    pub fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> LayerResult<Self> {
        Ok(Self {
            lin: linear(in_dim, out_dim, vb.pp("lin"))?,
            self_lin: linear(in_dim, out_dim, vb.pp("self_lin"))?,
        })
    }

    pub fn from_parts(lin: Linear, self_lin: Linear) -> Self {
        Self { lin, self_lin }
    }

    pub fn in_dim(&self) -> LayerResult<usize> {
        Ok(self.lin.weight().dim(1)?)
    }

    pub fn out_dim(&self) -> LayerResult<usize> {
        Ok(self.lin.weight().dim(0)?)
    }

    pub fn forward(&self, x: &Tensor, edges: &EdgeIndex) -> LayerResult<Tensor> {
        check_width(x, self.in_dim()?)?;
        edges.validate(x.dim(0)?)?;
        let mut out = self.self_lin.forward(x)?;
        if !edges.is_empty() {
            let (sources, targets) = edges.to_tensors(x.device())?;
            let messages = self.lin.forward(&x.index_select(&sources, 0)?)?;
            out = out.index_add(&targets, &messages, 0)?;
        }
        Ok(out.relu()?)
    }
}
