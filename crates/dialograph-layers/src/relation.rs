//! Relation-aware propagation
//!
//! Each relation type owns an independent linear transform and a learned
//! normalization scalar. For an edge `s → t` of relation `r` the message
//! `(W[t, s] / c_r) · Linear_r(x[s])` is summed into row `t`; relations with
//! no edges contribute nothing and their parameters receive no gradient.
//! Aggregation is a plain sum, so in-degree scales the output unless `c_r`
//! compensates.

use crate::common::{check_width, index_tensor, EdgeIndex, LayerError, LayerResult};
use candle_core::Tensor;
use candle_nn::{linear, Init, Linear, Module, VarBuilder};

#[derive(Debug, Clone)]
pub struct RelationAwareLayer {
    lins: Vec<Linear>,
    norm_constants: Tensor,
    in_dim: usize,
    out_dim: usize,
}

/// Edges of one relation type
#[derive(Debug, Default)]
struct RelationGroup {
    sources: Vec<usize>,
    targets: Vec<usize>,
    /// Row-major offsets `target * n + source` into the weight matrix
    weight_ids: Vec<usize>,
}

impl RelationAwareLayer {
    /// Parameters `lins.<r>.{weight,bias}` and `norm_constants` (initialised to 1)
    pub fn new(n_relations: usize, in_dim: usize, out_dim: usize, vb: VarBuilder) -> LayerResult<Self> {
        let lins = (0..n_relations)
            .map(|r| linear(in_dim, out_dim, vb.pp("lins").pp(r)))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let norm_constants = vb.get_with_hints(n_relations, "norm_constants", Init::Const(1.0))?;
        Ok(Self {
            lins,
            norm_constants,
            in_dim,
            out_dim,
        })
    }

    pub fn from_parts(lins: Vec<Linear>, norm_constants: Tensor) -> LayerResult<Self> {
        let (out_dim, in_dim) = match lins.first() {
            Some(lin) => lin.weight().dims2()?,
            None => (0, 0),
        };
        let n = norm_constants.dim(0)?;
        if n != lins.len() {
            return Err(LayerError::DimensionMismatch {
                expected: lins.len(),
                got: n,
            });
        }
        Ok(Self {
            lins,
            norm_constants,
            in_dim,
            out_dim,
        })
    }

    pub fn n_relations(&self) -> usize {
        self.lins.len()
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    pub fn norm_constants(&self) -> &Tensor {
        &self.norm_constants
    }

    fn group_edges(&self, edges: &EdgeIndex, edge_types: &[usize], n: usize) -> LayerResult<Vec<RelationGroup>> {
        if edge_types.len() != edges.len() {
            return Err(LayerError::EdgeTypeCount {
                types: edge_types.len(),
                edges: edges.len(),
            });
        }
        let mut groups: Vec<RelationGroup> = (0..self.n_relations()).map(|_| RelationGroup::default()).collect();
        for (edge, ((source, target), &relation)) in edges.iter().zip(edge_types).enumerate() {
            let Some(group) = groups.get_mut(relation) else {
                return Err(LayerError::RelationOutOfRange {
                    edge,
                    relation,
                    n_relations: self.n_relations(),
                });
            };
            group.sources.push(source);
            group.targets.push(target);
            group.weight_ids.push(target * n + source);
        }
        Ok(groups)
    }

    /// Propagate `x` along typed, weighted edges and apply ReLU
    pub fn forward(&self, x: &Tensor, edges: &EdgeIndex, edge_types: &[usize], weights: &Tensor) -> LayerResult<Tensor> {
        let n = x.dim(0)?;
        check_width(x, self.in_dim)?;
        let (rows, cols) = weights.dims2()?;
        if rows != n || cols != n {
            return Err(LayerError::WeightShape { rows, cols, expected: n });
        }
        edges.validate(n)?;
        let groups = self.group_edges(edges, edge_types, n)?;

        let device = x.device();
        let flat_weights = weights.flatten_all()?;
        let mut out = Tensor::zeros((n, self.out_dim), x.dtype(), device)?;
        for (r, group) in groups.iter().enumerate() {
            if group.sources.is_empty() {
                continue;
            }
            let sources = index_tensor(&group.sources, device)?;
            let targets = index_tensor(&group.targets, device)?;
            let edge_weights = flat_weights
                .index_select(&index_tensor(&group.weight_ids, device)?, 0)?
                .unsqueeze(1)?;
            let norm = self.norm_constants.narrow(0, r, 1)?;

            let messages = self.lins[r]
                .forward(&x.index_select(&sources, 0)?)?
                .broadcast_mul(&edge_weights)?
                .broadcast_div(&norm)?;
            out = out.index_add(&targets, &messages, 0)?;
        }
        Ok(out.relu()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Var};

    fn identity_lin() -> Linear {
        let weight = Tensor::eye(2, DType::F32, &Device::Cpu).unwrap();
        Linear::new(weight, Some(Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap()))
    }

    fn identity_layer(norms: &[f32]) -> RelationAwareLayer {
        let lins = norms.iter().map(|_| identity_lin()).collect();
        RelationAwareLayer::from_parts(lins, Tensor::new(norms, &Device::Cpu).unwrap()).unwrap()
    }

    fn t(rows: &[[f32; 2]]) -> Tensor {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (rows.len(), 2), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_sum_aggregation_into_target() {
        let layer = identity_layer(&[1.0]);
        let x = t(&[[1.0, 2.0], [3.0, 4.0], [0.5, 0.5]]);
        let edges = EdgeIndex::from_pairs(&[(0, 2), (1, 2)]);
        let weights = Tensor::ones((3, 3), DType::F32, &Device::Cpu).unwrap();
        let y = layer.forward(&x, &edges, &[0, 0], &weights).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(y[2], vec![4.0, 6.0]);
        assert_eq!(y[0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_norm_constant_and_edge_weight_scale_messages() {
        let layer = identity_layer(&[1.0, 2.0]);
        let x = t(&[[2.0, 2.0], [0.0, 0.0]]);
        let edges = EdgeIndex::from_pairs(&[(0, 1), (0, 1)]);
        // W[1, 0] is read for 0 → 1
        let weights = t(&[[1.0, 9.0], [0.5, 1.0]]);
        let y = layer.forward(&x, &edges, &[0, 1], &weights).unwrap().to_vec2::<f32>().unwrap();
        // 0.5 * 2 / 1 + 0.5 * 2 / 2
        assert_eq!(y[1], vec![1.5, 1.5]);
    }

    #[test]
    fn test_unused_relation_gets_no_gradient() {
        let device = Device::Cpu;
        let vars: Vec<(Var, Var)> = (0..3)
            .map(|_| {
                (
                    Var::from_tensor(&Tensor::eye(2, DType::F32, &device).unwrap()).unwrap(),
                    Var::zeros(2, DType::F32, &device).unwrap(),
                )
            })
            .collect();
        let lins = vars
            .iter()
            .map(|(w, b)| Linear::new(w.as_tensor().clone(), Some(b.as_tensor().clone())))
            .collect();
        let norms = Var::ones(3, DType::F32, &device).unwrap();
        let layer = RelationAwareLayer::from_parts(lins, norms.as_tensor().clone()).unwrap();

        let x = t(&[[1.0, 1.0], [1.0, 1.0]]);
        let edges = EdgeIndex::from_pairs(&[(0, 1)]);
        let weights = Tensor::ones((2, 2), DType::F32, &device).unwrap();
        let y = layer.forward(&x, &edges, &[1], &weights).unwrap();
        let grads = y.sum_all().unwrap().backward().unwrap();

        assert!(grads.get(vars[0].0.as_tensor()).is_none());
        assert!(grads.get(vars[1].0.as_tensor()).is_some());
        assert!(grads.get(vars[2].0.as_tensor()).is_none());
        // -(w / c^2) * <g, h> = -(1) * 2 for the used relation only
        let norm_grad = grads.get(norms.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(norm_grad, vec![0.0, -2.0, 0.0]);
    }

    #[test]
    fn test_rejects_out_of_range_relation() {
        let layer = identity_layer(&[1.0, 1.0]);
        let x = Tensor::zeros((2, 2), DType::F32, &Device::Cpu).unwrap();
        let edges = EdgeIndex::from_pairs(&[(0, 1)]);
        let weights = Tensor::ones((2, 2), DType::F32, &Device::Cpu).unwrap();
        let err = layer.forward(&x, &edges, &[5], &weights).unwrap_err();
        assert!(matches!(
            err,
            LayerError::RelationOutOfRange {
                edge: 0,
                relation: 5,
                n_relations: 2
            }
        ));
    }

    #[test]
    fn test_rejects_wrong_weight_shape() {
        let layer = identity_layer(&[1.0]);
        let x = Tensor::zeros((3, 2), DType::F32, &Device::Cpu).unwrap();
        let weights = Tensor::ones((2, 2), DType::F32, &Device::Cpu).unwrap();
        let err = layer.forward(&x, &EdgeIndex::new(), &[], &weights).unwrap_err();
        assert!(matches!(err, LayerError::WeightShape { rows: 2, cols: 2, expected: 3 }));
    }
}
