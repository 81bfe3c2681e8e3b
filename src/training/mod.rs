//! Training and evaluation glue
//!
//! [`ModelManager`] owns a model, its optimizer, loss and encoder, and runs
//! sequential epochs over a dataset. A checkpoint is a bincode file holding
//! the model configuration next to a safetensors file holding its weights;
//! file names encode the run's hyperparameters. Every epoch also leaves a
//! JSON snapshot of targets and predictions for offline analysis.

pub mod checkpoint;
pub mod manager;
pub mod snapshot;

pub use checkpoint::{
    load_checkpoint, read_checkpoint_header, save_checkpoint, weights_path, Checkpoint, CheckpointName,
    CHECKPOINT_EXTENSION,
};
pub use manager::{log_parameter_counts, EvalOutcome, ModelManager};
pub use snapshot::{EpochSnapshot, ToRows};

use crate::dataset::DatasetError;
use crate::model::ModelError;
use dialograph_layers::LayerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No records to {0}")]
    EmptyDataset(&'static str),
}

pub type TrainingResult<T> = Result<T, TrainingError>;
