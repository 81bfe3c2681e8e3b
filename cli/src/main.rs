//! Dialograph CLI: preprocess datasets, train and evaluate dialog models
//!
//! Settings come from an optional YAML file; flags override file values.

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use comfy_table::{ContentArrangement, Table};
use dialograph::dataset::{Collate, DiscriminationDataset, RatingDataset, Split};
use dialograph::embed::{HashingEncoder, PrecomputedEncoder, UtteranceEncoder};
use dialograph::model::{DialogDiscriminator, DialogModel, DialogRater, HingeLoss, Loss, MultiDimensionAbsLoss};
use dialograph::training::{load_checkpoint, log_parameter_counts, CheckpointName, EpochSnapshot, ModelManager};
use dialograph::{ComputeDevice, DialographConfig};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "dialograph", version, about = "Graph neural networks for dialog rating and discrimination")]
struct Cli {
    #[arg(long, value_enum)]
    mode: Mode,

    #[arg(long, value_enum, default_value = "rate")]
    task: Task,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding raw and processed dataset files
    #[arg(long)]
    data_root: Option<PathBuf>,

    #[arg(long)]
    lr: Option<f32>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Cap on training examples, also applied to the evaluation split
    #[arg(long)]
    n_training_points: Option<usize>,

    /// Propagation rounds in the graph embedding
    #[arg(long)]
    n_layers: Option<usize>,

    /// Rater graph embedding width
    #[arg(long)]
    graph_out_dim: Option<usize>,

    /// Checkpoint of the other task to take graph embedding parameters from
    #[arg(long)]
    pretrained: Option<PathBuf>,

    /// Checkpoint to evaluate
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// GPU ordinal; runs on the CPU when no CUDA backend is built in
    #[arg(long)]
    cuda: Option<usize>,

    /// Defaults to precomputed for rating and hashing for discrimination
    #[arg(long, value_enum)]
    encoder: Option<EncoderKind>,

    /// Output format
    #[arg(long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Preprocess,
    Train,
    Eval,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Task {
    Rate,
    Discriminate,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EncoderKind {
    Precomputed,
    Hashing,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    match cli.mode {
        Mode::Preprocess => run_preprocess(cli, &config),
        Mode::Train => match cli.task {
            Task::Rate => run_train_rater(cli, &config),
            Task::Discriminate => run_train_discriminator(cli, &config),
        },
        Mode::Eval => run_eval(cli, &config),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<DialographConfig> {
    let mut config = match &cli.config {
        Some(path) => DialographConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => DialographConfig::default(),
    };

    if let Some(root) = &cli.data_root {
        config.data_root = root.clone();
    }
    if let Some(lr) = cli.lr {
        config.training.learning_rate = lr;
    }
    if let Some(epochs) = cli.epochs {
        config.training.epochs = epochs;
    }
    if let Some(batch_size) = cli.batch_size {
        config.training.batch_size = batch_size;
    }
    if cli.n_training_points.is_some() {
        config.training.n_training_points = cli.n_training_points;
    }
    if let Some(n_layers) = cli.n_layers {
        config.rater.graph.n_layers = n_layers;
        config.discriminator.graph.n_layers = n_layers;
    }
    if let Some(dim) = cli.graph_out_dim {
        config.rater.graph.hidden_size = dim;
    }
    if let Some(ordinal) = cli.cuda {
        config.rater.graph.device = ComputeDevice::Cuda(ordinal);
        config.discriminator.graph.device = ComputeDevice::Cuda(ordinal);
    }

    config.validate()?;
    Ok(config)
}

fn encoder(cli: &Cli, embed_size: usize) -> Box<dyn UtteranceEncoder> {
    let kind = cli.encoder.unwrap_or(match cli.task {
        Task::Rate => EncoderKind::Precomputed,
        Task::Discriminate => EncoderKind::Hashing,
    });
    match kind {
        EncoderKind::Precomputed => Box::new(PrecomputedEncoder::new(embed_size)),
        EncoderKind::Hashing => Box::new(HashingEncoder::new(embed_size)),
    }
}

fn checkpoint_name(config: &DialographConfig, task: Task) -> CheckpointName {
    let (graph, graph_out_dim) = match task {
        Task::Rate => (&config.rater.graph, Some(config.rater.graph.hidden_size)),
        Task::Discriminate => (&config.discriminator.graph, None),
    };
    CheckpointName {
        n_layers: graph.n_layers,
        learning_rate: config.training.learning_rate,
        epochs: config.training.epochs,
        batch_size: config.training.batch_size,
        graph_out_dim,
    }
}

fn run_preprocess(cli: &Cli, config: &DialographConfig) -> anyhow::Result<()> {
    let root = &config.data_root;
    let rows = match cli.task {
        Task::Rate => {
            let stats = RatingDataset::process(root, config.rater.graph.n_relations)?;
            vec![
                ("data root".to_string(), root.display().to_string()),
                ("label dims".to_string(), stats.dims().to_string()),
                ("label mean".to_string(), format!("{:?}", stats.mean.to_vec())),
                ("label std".to_string(), format!("{:?}", stats.std.to_vec())),
            ]
        }
        Task::Discriminate => {
            let pairs = DiscriminationDataset::process(root, config.discriminator.graph.n_relations)?;
            vec![
                ("data root".to_string(), root.display().to_string()),
                ("pairs".to_string(), pairs.to_string()),
            ]
        }
    };
    print_summary(&rows, cli.format)
}

/// Train and test splits, both capped at `n_training_points`
fn rating_splits(config: &DialographConfig) -> anyhow::Result<(RatingDataset, RatingDataset)> {
    let n_relations = config.rater.graph.n_relations;
    let train = RatingDataset::open(&config.data_root, Split::Train, n_relations)?;
    let eval = RatingDataset::open(&config.data_root, Split::Test, n_relations)?;
    Ok(match config.training.n_training_points {
        Some(n) => (train.take(n), eval.take(n)),
        None => (train, eval),
    })
}

fn discrimination_splits(config: &DialographConfig) -> anyhow::Result<(DiscriminationDataset, DiscriminationDataset)> {
    let n_relations = config.discriminator.graph.n_relations;
    let train = DiscriminationDataset::open(&config.data_root, Split::Train, n_relations)?;
    let eval = DiscriminationDataset::open(&config.data_root, Split::Test, n_relations)?;
    Ok(match config.training.n_training_points {
        Some(n) => (train.take(n), eval.take(n)),
        None => (train, eval),
    })
}

fn run_train_rater(cli: &Cli, config: &DialographConfig) -> anyhow::Result<()> {
    let (train, eval) = rating_splits(config)?;

    let model = DialogRater::new(config.rater.clone())?;
    log_parameter_counts(&model);
    let base = checkpoint_name(config, Task::Rate).base_path(&config.training.checkpoint_dir);
    let mut manager = ModelManager::new(
        model,
        MultiDimensionAbsLoss::new(config.rater.n_dims),
        encoder(cli, config.rater.graph.embed_size),
        config.training.learning_rate,
        base,
    )?;
    if let Some(path) = &cli.pretrained {
        manager.load_graph_embedding::<DialogDiscriminator>(path)?;
    }

    let snapshots = manager.train(train.records(), Some(eval.records()), &config.training)?;
    let path = manager.checkpoint_path();
    manager.save(&path)?;
    print_epochs(&snapshots, &path, cli.format)
}

fn run_train_discriminator(cli: &Cli, config: &DialographConfig) -> anyhow::Result<()> {
    let (train, eval) = discrimination_splits(config)?;

    let model = DialogDiscriminator::new(config.discriminator.clone())?;
    log_parameter_counts(&model);
    let base = checkpoint_name(config, Task::Discriminate).base_path(&config.training.checkpoint_dir);
    let mut manager = ModelManager::new(
        model,
        HingeLoss,
        encoder(cli, config.discriminator.graph.embed_size),
        config.training.learning_rate,
        base,
    )?;
    if let Some(path) = &cli.pretrained {
        manager.load_graph_embedding::<DialogRater>(path)?;
    }

    let snapshots = manager.train(train.records(), Some(eval.records()), &config.training)?;
    let path = manager.checkpoint_path();
    manager.save(&path)?;
    print_epochs(&snapshots, &path, cli.format)
}

fn run_eval(cli: &Cli, config: &DialographConfig) -> anyhow::Result<()> {
    let Some(checkpoint) = &cli.checkpoint else {
        bail!("--checkpoint is required in eval mode");
    };

    match cli.task {
        Task::Rate => {
            let model = load_checkpoint::<DialogRater>(checkpoint)?;
            let test = RatingDataset::open(&config.data_root, Split::Test, model.config().graph.n_relations)?;
            let criterion = MultiDimensionAbsLoss::new(model.n_dims());
            let encoder = encoder(cli, model.config().graph.embed_size);
            evaluate(cli, config, checkpoint, model, criterion, encoder, test.records())
        }
        Task::Discriminate => {
            let model = load_checkpoint::<DialogDiscriminator>(checkpoint)?;
            let test = DiscriminationDataset::open(&config.data_root, Split::Test, model.config().graph.n_relations)?;
            let encoder = encoder(cli, model.config().graph.embed_size);
            evaluate(cli, config, checkpoint, model, HingeLoss, encoder, test.records())
        }
    }
}

fn evaluate<M, L, R>(
    cli: &Cli,
    config: &DialographConfig,
    checkpoint: &Path,
    model: M,
    criterion: L,
    encoder: Box<dyn UtteranceEncoder>,
    records: &[R],
) -> anyhow::Result<()>
where
    M: DialogModel,
    L: Loss,
    R: Collate<Batch = M::Input>,
{
    let manager = ModelManager::new(model, criterion, encoder, config.training.learning_rate, checkpoint)?;
    let outcome = manager.eval(records, config.training.batch_size, config.training.loss_window)?;
    info!("Evaluated {:?}", checkpoint);

    let mut rows = vec![
        ("checkpoint".to_string(), checkpoint.display().to_string()),
        ("records".to_string(), records.len().to_string()),
        ("mean loss".to_string(), format!("{:.4}", outcome.loss)),
    ];
    match cli.task {
        Task::Rate => {
            for (dim, error) in per_dimension_abs_error(&outcome.targets, &outcome.predictions)
                .iter()
                .enumerate()
            {
                rows.push((format!("dim {dim} mean abs error"), format!("{error:.4}")));
            }
        }
        Task::Discriminate => {
            rows.push((
                "accuracy".to_string(),
                format!("{:.4}", sign_accuracy(&outcome.targets, &outcome.predictions)),
            ));
        }
    }
    print_summary(&rows, cli.format)
}

fn per_dimension_abs_error(targets: &[Vec<f32>], predictions: &[Vec<f32>]) -> Vec<f32> {
    let dims = targets.first().map(Vec::len).unwrap_or(0);
    let mut sums = vec![0.0f32; dims];
    for (target, pred) in targets.iter().zip(predictions) {
        for (sum, (t, p)) in sums.iter_mut().zip(target.iter().zip(pred)) {
            *sum += (t - p).abs();
        }
    }
    let n = targets.len().max(1) as f32;
    sums.into_iter().map(|s| s / n).collect()
}

fn sign_accuracy(targets: &[Vec<f32>], predictions: &[Vec<f32>]) -> f32 {
    let correct = targets
        .iter()
        .zip(predictions)
        .filter(|(t, p)| t.first().zip(p.first()).is_some_and(|(t, p)| t * p > 0.0))
        .count();
    correct as f32 / targets.len().max(1) as f32
}

fn print_epochs(snapshots: &[EpochSnapshot], checkpoint: &Path, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let epochs: Vec<_> = snapshots
                .iter()
                .map(|s| json!({ "epoch": s.epoch, "train_loss": s.train_loss, "eval_loss": s.eval_loss }))
                .collect();
            let out = json!({ "checkpoint": checkpoint.display().to_string(), "epochs": epochs });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["epoch", "train loss", "eval loss"]);
            for s in snapshots {
                table.add_row(vec![
                    s.epoch.to_string(),
                    format!("{:.4}", s.train_loss),
                    s.eval_loss.map(|l| format!("{l:.4}")).unwrap_or_else(|| "-".to_string()),
                ]);
            }
            println!("{}", table);
            println!("Saved {}", checkpoint.display());
        }
    }
    Ok(())
}

fn print_summary(rows: &[(String, String)], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = rows
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["metric", "value"]);
            for (k, v) in rows {
                table.add_row(vec![k.as_str(), v.as_str()]);
            }
            println!("{}", table);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use dialograph::dataset::RawRatingData;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "dialograph",
            "--mode",
            "train",
            "--lr",
            "0.01",
            "--graph-out-dim",
            "10",
            "--cuda",
            "0",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.training.learning_rate, 0.01);
        assert_eq!(config.rater.graph.hidden_size, 10);
        assert_eq!(config.discriminator.graph.device, ComputeDevice::Cuda(0));
        assert_eq!(
            checkpoint_name(&config, Task::Rate).base(),
            "n_layers=1_lr=0.01_epochs=1_batch_size=16_graph_out_dim=10"
        );

        let cli = Cli::parse_from(["dialograph", "--mode", "train", "--n-layers", "3"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.rater.graph.n_layers, 3);
        assert_eq!(config.discriminator.graph.n_layers, 3);
    }

    #[test]
    fn test_repeated_rounds_with_narrow_output_are_rejected() {
        let cli = Cli::parse_from(["dialograph", "--mode", "train", "--n-layers", "2", "--graph-out-dim", "10"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_training_cap_applies_to_eval_split() {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = RawRatingData::default();
        for i in 0..10 {
            raw.nodes.push(vec![vec![i as f32, 1.0]; 2]);
            raw.edge_idxs.push(vec![(0, 1)]);
            raw.edges.push(vec![0]);
            raw.labels.push(vec![i as f32]);
        }
        raw.save(dir.path()).unwrap();

        let root = dir.path().to_string_lossy().into_owned();
        let cli = Cli::parse_from(["dialograph", "--mode", "train", "--data-root", &root]);
        let (train, eval) = rating_splits(&load_config(&cli).unwrap()).unwrap();
        assert_eq!((train.len(), eval.len()), (8, 2));

        let cli = Cli::parse_from([
            "dialograph",
            "--mode",
            "train",
            "--data-root",
            &root,
            "--n-training-points",
            "1",
        ]);
        let (train, eval) = rating_splits(&load_config(&cli).unwrap()).unwrap();
        assert_eq!((train.len(), eval.len()), (1, 1));
    }

    #[test]
    fn test_metrics() {
        let targets = vec![vec![1.0, 0.0], vec![-1.0, 2.0]];
        let preds = vec![vec![0.5, 0.0], vec![-1.0, 1.0]];
        assert_eq!(per_dimension_abs_error(&targets, &preds), vec![0.25, 0.5]);

        let targets = vec![vec![1.0], vec![-1.0], vec![1.0], vec![-1.0]];
        let preds = vec![vec![0.3], vec![0.2], vec![2.0], vec![-0.1]];
        assert_eq!(sign_accuracy(&targets, &preds), 0.75);
    }

    #[test]
    fn test_eval_requires_checkpoint() {
        let cli = Cli::parse_from(["dialograph", "--mode", "eval"]);
        let config = load_config(&cli).unwrap();
        assert!(run_eval(&cli, &config).is_err());
    }
}
