//! Per-epoch prediction snapshots

use super::TrainingResult;
use candle_core::Tensor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Flatten model outputs and targets into JSON-friendly rows
pub trait ToRows {
    fn to_rows(&self) -> TrainingResult<Vec<Vec<f32>>>;
}

/// A vector becomes one single-value row per entry, a matrix one row per row
impl ToRows for Tensor {
    fn to_rows(&self) -> TrainingResult<Vec<Vec<f32>>> {
        let host = self.detach().to_dtype(candle_core::DType::F32)?;
        match host.rank() {
            1 => Ok(host.to_vec1::<f32>()?.into_iter().map(|v| vec![v]).collect()),
            _ => Ok(host.flatten_from(1)?.to_vec2::<f32>()?),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSnapshot {
    /// 1-based
    pub epoch: usize,
    pub train_target: Vec<Vec<f32>>,
    pub train_preds: Vec<Vec<f32>>,
    pub eval_target: Option<Vec<Vec<f32>>>,
    pub eval_preds: Option<Vec<Vec<f32>>>,
    pub train_loss: f32,
    pub eval_loss: Option<f32>,
    pub written_at: DateTime<Utc>,
}

impl EpochSnapshot {
    /// `<output>/<model_name>_epoch=<n>.json`
    pub fn path(output_dir: &Path, model_name: &str, epoch: usize) -> PathBuf {
        output_dir.join(format!("{model_name}_epoch={epoch}.json"))
    }

    pub fn write(&self, output_dir: &Path, model_name: &str) -> TrainingResult<PathBuf> {
        std::fs::create_dir_all(output_dir)?;
        let path = Self::path(output_dir, model_name, self.epoch);
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }

    pub fn read(path: &Path) -> TrainingResult<Self> {
        Ok(serde_json::from_slice(&std::fs::read(path)?)?)
    }
}
