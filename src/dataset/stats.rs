//! Dataset-wide label normalisation

use super::{DatasetError, DatasetResult};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-dimension mean and standard deviation of the raw labels
///
/// Computed once at preprocessing and stored next to the processed splits,
/// so later runs normalise and denormalise with the same constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    pub mean: Array1<f32>,
    pub std: Array1<f32>,
}

impl LabelStats {
    /// Column statistics with the unbiased (N − 1) standard deviation.
    /// Dimensions with zero or undefined spread get a std of 1.
    pub fn compute(labels: &[Vec<f32>]) -> DatasetResult<Self> {
        let width = labels.first().map(Vec::len).ok_or(DatasetError::Empty)?;
        if let Some((index, row)) = labels.iter().enumerate().find(|(_, l)| l.len() != width) {
            return Err(DatasetError::Inconsistent(format!(
                "label {} has {} dimensions, expected {}",
                index,
                row.len(),
                width
            )));
        }

        let flat: Vec<f32> = labels.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((labels.len(), width), flat)
            .map_err(|e| DatasetError::Inconsistent(e.to_string()))?;

        let mean = matrix.mean_axis(Axis(0)).ok_or(DatasetError::Empty)?;
        let std = if labels.len() > 1 {
            matrix.std_axis(Axis(0), 1.0)
        } else {
            Array1::zeros(width)
        };
        let std = std.mapv(|s| if s.is_finite() && s > 0.0 { s } else { 1.0 });
        Ok(Self { mean, std })
    }

    pub fn dims(&self) -> usize {
        self.mean.len()
    }

    pub fn normalize(&self, label: ArrayView1<f32>) -> Array1<f32> {
        (&label - &self.mean) / &self.std
    }

    pub fn denormalize(&self, label: ArrayView1<f32>) -> Array1<f32> {
        &label * &self.std + &self.mean
    }
}
