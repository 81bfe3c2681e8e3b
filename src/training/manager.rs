//! Epoch loop, evaluation and checkpoint handling

use super::checkpoint::{load_checkpoint, save_checkpoint, CHECKPOINT_EXTENSION};
use super::snapshot::{EpochSnapshot, ToRows};
use super::{TrainingError, TrainingResult};
use crate::config::TrainingConfig;
use crate::dataset::{Collate, DataLoader};
use crate::embed::UtteranceEncoder;
use crate::model::{DialogModel, Loss};
use candle_nn::{AdamW, Optimizer};
use chrono::Utc;
use dialograph_layers::adam;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Targets, predictions and mean batch loss of one evaluation pass
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    pub targets: Vec<Vec<f32>>,
    pub predictions: Vec<Vec<f32>>,
    pub loss: f32,
}

pub struct ModelManager<M, L> {
    model: M,
    /// Adam over every variable of the model's store
    optimizer: AdamW,
    criterion: L,
    encoder: Box<dyn UtteranceEncoder>,
    /// Checkpoint path without extension; its file name names the snapshots
    base_path: PathBuf,
}

impl<M, L> ModelManager<M, L>
where
    M: DialogModel,
    L: Loss,
{
    pub fn new(
        model: M,
        criterion: L,
        encoder: Box<dyn UtteranceEncoder>,
        learning_rate: f32,
        base_path: impl Into<PathBuf>,
    ) -> TrainingResult<Self> {
        let optimizer = adam(model.varmap().all_vars(), f64::from(learning_rate))?;
        Ok(Self {
            model,
            optimizer,
            criterion,
            encoder,
            base_path: base_path.into(),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn encoder(&self) -> &dyn UtteranceEncoder {
        self.encoder.as_ref()
    }

    pub fn model_name(&self) -> String {
        self.base_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string())
    }

    /// `<base>.ckpt`
    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.{}", self.base_path.display(), CHECKPOINT_EXTENSION))
    }

    /// `<base>_epoch=<n>.ckpt`
    pub fn epoch_checkpoint_path(&self, epoch: usize) -> PathBuf {
        PathBuf::from(format!(
            "{}_epoch={}.{}",
            self.base_path.display(),
            epoch,
            CHECKPOINT_EXTENSION
        ))
    }

    /// Run `config.epochs` epochs over `train`, evaluating on `eval` after each
    pub fn train<R>(&mut self, train: &[R], eval: Option<&[R]>, config: &TrainingConfig) -> TrainingResult<Vec<EpochSnapshot>>
    where
        R: Collate<Batch = M::Input>,
    {
        if train.is_empty() {
            return Err(TrainingError::EmptyDataset("train on"));
        }
        let window = config.loss_window.max(1);
        let mut snapshots = Vec::with_capacity(config.epochs);

        for epoch in 1..=config.epochs {
            let mut loader = DataLoader::new(train, config.batch_size);
            if config.shuffle {
                loader = loader.shuffled(config.seed.wrapping_add(epoch as u64));
            }
            let num_batches = loader.num_batches();

            let mut targets = Vec::new();
            let mut preds = Vec::new();
            let mut batch_losses: Vec<f32> = Vec::with_capacity(num_batches);

            for (i, records) in loader.enumerate() {
                let (batch, target) = R::collate(&records, self.model.device())?;
                let output = self.model.forward(self.encoder.as_ref(), &batch)?;
                let loss_tensor = self.criterion.forward(&output, &target)?;
                self.optimizer.backward_step(&loss_tensor)?;
                let loss = loss_tensor.to_scalar::<f32>()?;

                targets.extend(target.to_rows()?);
                preds.extend(output.to_rows()?);
                batch_losses.push(loss);
                debug!(
                    "Epoch {}/{} batch {}/{}: loss {:.4}, epoch mean {:.4}, window mean {:.4}",
                    epoch,
                    config.epochs,
                    i + 1,
                    num_batches,
                    loss,
                    mean(&batch_losses),
                    mean(window_of(&batch_losses, window))
                );
            }

            let train_loss = mean(&batch_losses);
            info!(
                "Epoch {}/{} finished: mean {} loss {:.4} (last {} batches {:.4})",
                epoch,
                config.epochs,
                self.criterion.name(),
                train_loss,
                window.min(batch_losses.len()),
                mean(window_of(&batch_losses, window))
            );

            if config.save_every_epoch {
                self.save(&self.epoch_checkpoint_path(epoch))?;
            }

            let evaluation = match eval {
                Some(records) if !records.is_empty() => Some(self.eval(records, config.batch_size, window)?),
                _ => None,
            };

            let snapshot = EpochSnapshot {
                epoch,
                train_target: targets,
                train_preds: preds,
                eval_target: evaluation.as_ref().map(|e| e.targets.clone()),
                eval_preds: evaluation.as_ref().map(|e| e.predictions.clone()),
                train_loss,
                eval_loss: evaluation.as_ref().map(|e| e.loss),
                written_at: Utc::now(),
            };
            let path = snapshot.write(&config.output_dir, &self.model_name())?;
            debug!("Wrote epoch snapshot {:?}", path);
            snapshots.push(snapshot);
        }

        Ok(snapshots)
    }

    /// Score `records` in order without touching parameters
    pub fn eval<R>(&self, records: &[R], batch_size: usize, loss_window: usize) -> TrainingResult<EvalOutcome>
    where
        R: Collate<Batch = M::Input>,
    {
        if records.is_empty() {
            return Err(TrainingError::EmptyDataset("evaluate"));
        }
        let window = loss_window.max(1);
        let mut targets = Vec::with_capacity(records.len());
        let mut predictions = Vec::with_capacity(records.len());
        let mut batch_losses = Vec::new();

        for batch in DataLoader::new(records, batch_size).collated(self.model.device()) {
            let (input, target) = batch?;
            let output = self.model.predict(self.encoder.as_ref(), &input)?;
            batch_losses.push(self.criterion.forward(&output, &target)?.to_scalar::<f32>()?);
            targets.extend(target.to_rows()?);
            predictions.extend(output.to_rows()?);
            debug!(
                "Evaluating: mean loss {:.4}, window mean {:.4}",
                mean(&batch_losses),
                mean(window_of(&batch_losses, window))
            );
        }

        let loss = mean(&batch_losses);
        info!("Evaluated {} records: mean loss {:.4}", records.len(), loss);
        Ok(EvalOutcome {
            targets,
            predictions,
            loss,
        })
    }

    pub fn save(&self, path: &Path) -> TrainingResult<()> {
        save_checkpoint(path, &self.model)
    }

    /// Replace the model with the one stored at `path`.
    ///
    /// The optimizer restarts with fresh moment estimates over the loaded
    /// model's parameters.
    pub fn load(&mut self, path: &Path) -> TrainingResult<()> {
        let model = load_checkpoint::<M>(path)?;
        let learning_rate = self.optimizer.learning_rate();
        self.optimizer = adam(model.varmap().all_vars(), learning_rate)?;
        self.model = model;
        Ok(())
    }

    /// Take graph embedding parameters from another model's checkpoint,
    /// e.g. a trained discriminator before rater training
    pub fn load_graph_embedding<S: DialogModel>(&mut self, path: &Path) -> TrainingResult<()> {
        let source = load_checkpoint::<S>(path)?;
        self.model
            .graph_embedding()
            .copy_parameters_from(source.graph_embedding())?;
        info!(
            "Transferred {} graph embedding parameters from {:?}",
            source.graph_embedding().num_parameters(),
            path
        );
        Ok(())
    }
}

/// Log total and graph-embedding parameter counts; returns them in that order
pub fn log_parameter_counts<M: DialogModel>(model: &M) -> (usize, usize) {
    let total = model.num_parameters();
    let graph = model.graph_embedding().num_parameters();
    info!("Total parameters: {}", total);
    info!("Graph embedding parameters: {}", graph);
    (total, graph)
}

fn window_of(losses: &[f32], window: usize) -> &[f32] {
    &losses[losses.len().saturating_sub(window)..]
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
