//! Model checkpoints
//!
//! `<name>.ckpt` is a bincode header with provenance and the model
//! configuration; `<name>.ckpt.safetensors` holds the parameters by name.
//! Loading rebuilds the model from the configuration, then overwrites every
//! parameter from the weights file.

use super::TrainingResult;
use crate::model::DialogModel;
use chrono::{DateTime, Utc};
use dialograph_layers::{assign_parameters, named_parameters};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

pub const CHECKPOINT_EXTENSION: &str = "ckpt";

/// Appended to the checkpoint path for the weights file
pub const WEIGHTS_EXTENSION: &str = "safetensors";

/// Checkpoint header: provenance and the configuration to rebuild from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint<C> {
    pub version: String,
    pub saved_at: DateTime<Utc>,
    pub config: C,
    /// Number of scalar parameters in the weights file
    pub num_parameters: usize,
}

/// `<path>.safetensors`
pub fn weights_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(WEIGHTS_EXTENSION);
    PathBuf::from(name)
}

pub fn save_checkpoint<M: DialogModel>(path: &Path, model: &M) -> TrainingResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let checkpoint = Checkpoint {
        version: crate::VERSION.to_string(),
        saved_at: Utc::now(),
        config: model.config(),
        num_parameters: model.num_parameters(),
    };
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, &checkpoint)?;
    model.varmap().save(weights_path(path))?;
    info!("Saved checkpoint to {:?}", path);
    Ok(())
}

pub fn read_checkpoint_header<C: DeserializeOwned>(path: &Path) -> TrainingResult<Checkpoint<C>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

pub fn load_checkpoint<M: DialogModel>(path: &Path) -> TrainingResult<M> {
    let header = read_checkpoint_header::<M::Config>(path)?;
    let model = M::from_config(header.config)?;
    let tensors = candle_core::safetensors::load(weights_path(path), model.device())?;
    assign_parameters(&named_parameters(model.varmap(), "")?, &tensors)?;
    info!(
        "Loaded checkpoint {:?} (version {}, saved {}, {} parameters)",
        path, header.version, header.saved_at, header.num_parameters
    );
    Ok(model)
}

/// Hyperparameters encoded in a checkpoint file name
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointName {
    pub n_layers: usize,
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
    /// Rater checkpoints also record the graph embedding width
    pub graph_out_dim: Option<usize>,
}

impl CheckpointName {
    /// `n_layers=<L>_lr=<lr>_epochs=<E>_batch_size=<B>[_graph_out_dim=<H>]`
    pub fn base(&self) -> String {
        let mut name = format!(
            "n_layers={}_lr={}_epochs={}_batch_size={}",
            self.n_layers, self.learning_rate, self.epochs, self.batch_size
        );
        if let Some(dim) = self.graph_out_dim {
            name.push_str(&format!("_graph_out_dim={dim}"));
        }
        name
    }

    /// Base path inside `dir`, without extension
    pub fn base_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.base())
    }

    pub fn path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.base(), CHECKPOINT_EXTENSION))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscriminatorConfig, GraphEmbeddingConfig};
    use crate::model::DialogDiscriminator;

    #[test]
    fn test_discriminator_name() {
        let name = CheckpointName {
            n_layers: 1,
            learning_rate: 0.001,
            epochs: 4,
            batch_size: 16,
            graph_out_dim: None,
        };
        assert_eq!(name.base(), "n_layers=1_lr=0.001_epochs=4_batch_size=16");
        assert_eq!(
            name.path(Path::new("ckpts")),
            PathBuf::from("ckpts/n_layers=1_lr=0.001_epochs=4_batch_size=16.ckpt")
        );
    }

    #[test]
    fn test_rater_name_adds_graph_width() {
        let name = CheckpointName {
            n_layers: 10,
            learning_rate: 0.01,
            epochs: 2,
            batch_size: 8,
            graph_out_dim: Some(10),
        };
        assert_eq!(name.base(), "n_layers=10_lr=0.01_epochs=2_batch_size=8_graph_out_dim=10");
    }

    #[test]
    fn test_weights_sit_next_to_header() {
        let path = Path::new("ckpts/n_layers=1_lr=0.001.ckpt");
        assert_eq!(weights_path(path), PathBuf::from("ckpts/n_layers=1_lr=0.001.ckpt.safetensors"));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/model.ckpt");
        let config = DiscriminatorConfig {
            graph: GraphEmbeddingConfig {
                n_relations: 2,
                embed_size: 4,
                hidden_size: 3,
                seed: 5,
                ..GraphEmbeddingConfig::default()
            },
        };
        let model = DialogDiscriminator::new(config.clone()).unwrap();
        save_checkpoint(&path, &model).unwrap();
        assert!(weights_path(&path).exists());

        let header: Checkpoint<DiscriminatorConfig> = read_checkpoint_header(&path).unwrap();
        assert_eq!(header.version, crate::VERSION);
        assert_eq!(header.config, config);
        assert_eq!(header.num_parameters, model.num_parameters());

        let loaded: DialogDiscriminator = load_checkpoint(&path).unwrap();
        assert_eq!(loaded.parameter_values().unwrap(), model.parameter_values().unwrap());
    }

    #[test]
    fn test_loading_restores_trained_weights_not_seeded_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");
        let model = DialogDiscriminator::new(DiscriminatorConfig {
            graph: GraphEmbeddingConfig {
                embed_size: 4,
                hidden_size: 4,
                ..GraphEmbeddingConfig::default()
            },
        })
        .unwrap();
        {
            let vars = model.varmap().data().lock().unwrap();
            vars["lin.bias"]
                .set(&candle_core::Tensor::new(&[7.5f32], model.device()).unwrap())
                .unwrap();
        }
        save_checkpoint(&path, &model).unwrap();

        let loaded: DialogDiscriminator = load_checkpoint(&path).unwrap();
        assert_eq!(loaded.parameter_values().unwrap()["lin.bias"], vec![7.5]);
    }

    #[test]
    fn test_missing_weights_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");
        let model = DialogDiscriminator::new(DiscriminatorConfig {
            graph: GraphEmbeddingConfig {
                embed_size: 4,
                hidden_size: 4,
                ..GraphEmbeddingConfig::default()
            },
        })
        .unwrap();
        save_checkpoint(&path, &model).unwrap();
        std::fs::remove_file(weights_path(&path)).unwrap();
        assert!(load_checkpoint::<DialogDiscriminator>(&path).is_err());
    }
}
