use std::path::PathBuf;

use clap::Parser;
use seqlab_core::{LabelerConfig, LabelerKind};
use seqlab_trainer::{TrainerConfig, run_training};
use tracing::error;

/// CLI arguments
#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train a softmax or CRF sequence labeler on tab-separated data")]
#[command(version)]
struct Cli {
    /// Training data: `token<TAB>label` lines, blank line between sentences
    #[arg(short, long)]
    data: PathBuf,

    /// JSON file with trainer settings; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file with labeler settings; replaces the `labeler` section of `--config`
    #[arg(long)]
    labeler_config: Option<PathBuf>,

    /// Labeling head: `independent` or `crf`
    #[arg(short, long)]
    labeler: Option<LabelerKind>,

    /// Number of passes over the data
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Sentences per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// AdamW learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Shuffle seed
    #[arg(long)]
    seed: Option<u64>,

    /// Path to a BEER wrapper used to score the trained model
    #[arg(long)]
    beer: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("Training failed: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => TrainerConfig::from_json_file(path)?,
        None => TrainerConfig::default(),
    };

    if let Some(path) = &cli.labeler_config {
        config.labeler = LabelerConfig::from_json_file(path)?;
    }
    if let Some(kind) = cli.labeler {
        config.labeler.kind = kind;
    }
    if let Some(epochs) = cli.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(lr) = cli.learning_rate {
        config.learning_rate = lr;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    run_training(&cli.data, config, cli.beer.as_deref())?;
    Ok(())
}
