//! Training objectives
//!
//! Losses return a scalar tensor that stays attached to the model output, so
//! the optimizer can backpropagate through it directly.

use super::{ModelError, ModelResult};
use candle_core::Tensor;

/// A scalar objective over model outputs
pub trait Loss {
    fn forward(&self, output: &Tensor, target: &Tensor) -> ModelResult<Tensor>;

    fn name(&self) -> &'static str;
}

/// Mean absolute error per dimension, summed across dimensions
///
/// An L1 objective. Existing rater checkpoints are trained against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiDimensionAbsLoss {
    pub n_dims: usize,
}

impl MultiDimensionAbsLoss {
    pub fn new(n_dims: usize) -> Self {
        Self { n_dims }
    }

    /// View a flattened target as `(len / n_dims) × n_dims`
    pub fn reshape_target(&self, flat: &Tensor) -> ModelResult<Tensor> {
        let len = flat.elem_count();
        if self.n_dims == 0 || len % self.n_dims != 0 {
            return Err(ModelError::ShapeMismatch(format!(
                "cannot split {} target values into rows of {}",
                len, self.n_dims
            )));
        }
        Ok(flat.reshape((len / self.n_dims, self.n_dims))?)
    }

    fn check(&self, output: &Tensor, target: &Tensor) -> ModelResult<()> {
        let (rows, cols) = output.dims2()?;
        let (target_rows, target_cols) = target.dims2()?;
        if rows != target_rows || cols < self.n_dims || target_cols < self.n_dims {
            return Err(ModelError::ShapeMismatch(format!(
                "loss over {} dims got output {:?} and target {:?}",
                self.n_dims,
                output.dims(),
                target.dims()
            )));
        }
        if rows == 0 {
            return Err(ModelError::EmptyBatch);
        }
        Ok(())
    }
}

impl Loss for MultiDimensionAbsLoss {
    /// Only the first `n_dims` columns of output and target are compared
    fn forward(&self, output: &Tensor, target: &Tensor) -> ModelResult<Tensor> {
        self.check(output, target)?;
        let output = output.narrow(1, 0, self.n_dims)?;
        let target = target.narrow(1, 0, self.n_dims)?;
        Ok((output - target)?.abs()?.mean(0)?.sum_all()?)
    }

    fn name(&self) -> &'static str {
        "multi_dimension_abs"
    }
}

/// `mean(max(0, 1 − t·o))` for targets in {−1, +1}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HingeLoss;

impl HingeLoss {
    fn check(output: &Tensor, target: &Tensor) -> ModelResult<()> {
        let len = output.dims1()?;
        let target_len = target.dims1()?;
        if len != target_len {
            return Err(ModelError::ShapeMismatch(format!(
                "hinge loss got {} outputs and {} targets",
                len, target_len
            )));
        }
        if len == 0 {
            return Err(ModelError::EmptyBatch);
        }
        Ok(())
    }
}

impl Loss for HingeLoss {
    fn forward(&self, output: &Tensor, target: &Tensor) -> ModelResult<Tensor> {
        Self::check(output, target)?;
        Ok((target * output)?.affine(-1.0, 1.0)?.relu()?.mean_all()?)
    }

    fn name(&self) -> &'static str {
        "hinge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use candle_core::{DType, Device, Var};

    fn matrix(rows: &[[f32; 2]]) -> Tensor {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (rows.len(), 2), &Device::Cpu).unwrap()
    }

    fn vector(values: &[f32]) -> Tensor {
        Tensor::new(values, &Device::Cpu).unwrap()
    }

    fn scalar(t: Tensor) -> f32 {
        t.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn test_abs_loss_sums_dimension_means() {
        let loss = MultiDimensionAbsLoss::new(2);
        let output = matrix(&[[1.0, 0.0], [3.0, 2.0]]);
        let target = matrix(&[[0.0, 0.0], [1.0, 0.0]]);
        // dim 0: (1 + 2) / 2, dim 1: (0 + 2) / 2
        assert_abs_diff_eq!(scalar(loss.forward(&output, &target).unwrap()), 2.5);
    }

    #[test]
    fn test_abs_loss_gradient_signs() {
        let loss = MultiDimensionAbsLoss::new(2);
        let output = Var::from_tensor(&matrix(&[[1.0, 0.5], [-1.0, 2.0]])).unwrap();
        let target = matrix(&[[0.0, 0.0], [1.0, 0.0]]);
        let grads = loss.forward(output.as_tensor(), &target).unwrap().backward().unwrap();
        let grad = grads.get(output.as_tensor()).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(grad, vec![vec![0.5, 0.5], vec![-0.5, 0.5]]);
    }

    #[test]
    fn test_abs_loss_rejects_narrow_output() {
        let loss = MultiDimensionAbsLoss::new(3);
        let x = Tensor::zeros((2, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(loss.forward(&x, &x), Err(ModelError::ShapeMismatch(_))));
    }

    #[test]
    fn test_abs_loss_ignores_extra_columns() {
        let loss = MultiDimensionAbsLoss::new(1);
        let output = Var::from_tensor(&matrix(&[[1.0, 9.0], [1.0, -9.0]])).unwrap();
        let target = Tensor::zeros((2, 2), DType::F32, &Device::Cpu).unwrap();
        let value = loss.forward(output.as_tensor(), &target).unwrap();
        assert_abs_diff_eq!(scalar(value.clone()), 1.0);
        let grads = value.backward().unwrap();
        let grad = grads.get(output.as_tensor()).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(grad, vec![vec![0.5, 0.0], vec![0.5, 0.0]]);
    }

    #[test]
    fn test_reshape_flat_target() {
        let loss = MultiDimensionAbsLoss::new(2);
        let flat = vector(&[1.0, 2.0, 3.0, 4.0]);
        let target = loss.reshape_target(&flat).unwrap();
        assert_eq!(target.to_vec2::<f32>().unwrap(), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert!(loss.reshape_target(&vector(&[1.0, 2.0, 3.0])).is_err());
    }

    #[test]
    fn test_hinge_loss() {
        let output = Var::new(&[2.0f32, 0.5, -1.0], &Device::Cpu).unwrap();
        let target = vector(&[1.0, 1.0, 1.0]);
        let value = HingeLoss.forward(output.as_tensor(), &target).unwrap();
        // 0 + 0.5 + 2
        assert_abs_diff_eq!(scalar(value.clone()), 2.5 / 3.0, epsilon = 1e-6);
        let grads = value.backward().unwrap();
        let grad = grads.get(output.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert_abs_diff_eq!(grad[0], 0.0);
        assert_abs_diff_eq!(grad[1], -1.0 / 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(grad[2], -1.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_hinge_negative_target() {
        let output = Var::new(&[-3.0f32, 0.0], &Device::Cpu).unwrap();
        let target = vector(&[-1.0, -1.0]);
        let value = HingeLoss.forward(output.as_tensor(), &target).unwrap();
        assert_abs_diff_eq!(scalar(value.clone()), 0.5);
        let grads = value.backward().unwrap();
        let grad = grads.get(output.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(grad, vec![0.0, 0.5]);
    }

    #[test]
    fn test_mismatched_and_empty_batches() {
        let empty = Tensor::zeros(0, DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(HingeLoss.forward(&empty, &empty), Err(ModelError::EmptyBatch)));
        assert!(matches!(
            HingeLoss.forward(&vector(&[1.0]), &vector(&[1.0, -1.0])),
            Err(ModelError::ShapeMismatch(_))
        ));
    }
}
