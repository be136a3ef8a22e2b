//! # Seqlab Trainer
//!
//! Training workflow for seqlab labelers: tab-separated dataset loading, a
//! small embedding encoder, the optimizer loop, and aggregation of
//! per-batch results.

pub mod data;
pub mod encoder;
pub mod runner;
pub mod trainer;

use std::path::Path;

use seqlab_core::{BeerWrapper, Evaluator};
use tracing::info;

pub use data::{TrainingExample, load_tagged_dataset};
pub use runner::{ExecutionResult, collect_finished};
pub use trainer::{EpochSummary, Trainer, TrainerConfig};

/// Train on `data_path`, optionally scoring the final model with a BEER wrapper.
pub fn run_training(
    data_path: &Path,
    config: TrainerConfig,
    beer_wrapper: Option<&Path>,
) -> anyhow::Result<Vec<EpochSummary>> {
    if !data_path.exists() {
        anyhow::bail!("Training data not found: {}", data_path.display());
    }

    let examples = load_tagged_dataset(data_path)?;
    if examples.is_empty() {
        anyhow::bail!("No labeled sentences in {}", data_path.display());
    }
    info!("Loaded {} training examples", examples.len());

    let mut trainer = Trainer::new(config, &examples)?;
    let summaries = trainer.train(&examples)?;

    if let Some(wrapper) = beer_wrapper {
        let beer = BeerWrapper::new(wrapper);
        let score = trainer.score_with(&beer, &examples)?;
        info!("{} on training data: {:.4}", beer.name(), score);
    }

    Ok(summaries)
}
