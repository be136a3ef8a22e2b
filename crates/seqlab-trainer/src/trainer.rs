//! Training loop for the sequence labelers.

use std::path::Path;

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use seqlab_core::{Evaluator, LabelerConfig, SequenceLabeler, Vocabulary};

use crate::data::{TrainingExample, WordVocab, shuffled_indices};
use crate::encoder::EmbeddingEncoder;
use crate::runner::{ExecutionResult, collect_finished};

/// Settings for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub labeler: LabelerConfig,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            labeler: LabelerConfig::default(),
            epochs: 3,
            batch_size: 32,
            learning_rate: 1e-2,
            seed: 42,
        }
    }
}

impl TrainerConfig {
    /// Load settings from JSON; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }
}

/// Loss and token accuracy over a pass through a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
}

/// Fraction of gold tokens whose label was predicted exactly.
pub fn token_accuracy(predicted: &[Vec<String>], gold: &[Vec<String>]) -> f32 {
    let mut correct = 0usize;
    let mut total = 0usize;
    for (pred, gold) in predicted.iter().zip(gold) {
        total += gold.len();
        correct += pred.iter().zip(gold).filter(|(p, g)| p == g).count();
    }
    if total > 0 {
        correct as f32 / total as f32
    } else {
        0.0
    }
}

/// Encoder + labeler trained jointly with AdamW.
pub struct Trainer {
    config: TrainerConfig,
    varmap: VarMap,
    encoder: EmbeddingEncoder,
    labeler: SequenceLabeler,
    words: WordVocab,
    optimizer: AdamW,
    rng: oorandom::Rand32,
    device: Device,
}

impl Trainer {
    /// Build vocabularies from `examples` and initialize all parameters.
    pub fn new(config: TrainerConfig, examples: &[TrainingExample]) -> anyhow::Result<Self> {
        config.labeler.validate()?;
        if config.batch_size == 0 {
            anyhow::bail!("batch_size must be > 0");
        }

        let device = Device::Cpu;
        let words = WordVocab::from_examples(examples);
        let labels = Vocabulary::from_labels(examples.iter().flat_map(|e| e.labels.iter()))?;
        info!(
            words = words.vocab_size(),
            labels = labels.len(),
            kind = ?config.labeler.kind,
            "building model"
        );

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = EmbeddingEncoder::new(
            words.vocab_size(),
            config.labeler.embedding_dim,
            config.labeler.hidden_dim,
            vb.pp("encoder"),
        )?;
        let labeler = SequenceLabeler::new(&config.labeler, labels, vb.pp("labeler"))?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate,
                ..Default::default()
            },
        )?;
        let rng = oorandom::Rand32::new(config.seed);

        Ok(Self {
            config,
            varmap,
            encoder,
            labeler,
            words,
            optimizer,
            rng,
            device,
        })
    }

    pub fn labeler(&self) -> &SequenceLabeler {
        &self.labeler
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Forward one labeled batch, returning its result and the loss tensor.
    fn forward_batch(
        &self,
        batch: &[&TrainingExample],
    ) -> anyhow::Result<(ExecutionResult<Vec<String>>, Tensor)> {
        let tokens: Vec<&[String]> = batch.iter().map(|e| e.tokens.as_slice()).collect();
        let gold: Vec<Vec<String>> = batch.iter().map(|e| e.labels.clone()).collect();

        let encoded = self.encoder.encode(&tokens, &self.words, &self.device)?;
        let targets = self.labeler.feed(Some(gold.as_slice()))?;
        let output = self.labeler.forward(&encoded, targets.as_ref())?;
        let loss = output
            .loss
            .context("labeler produced no loss for a labeled batch")?;

        let predicted = self.labeler.labels(&output.decoded)?;
        let value = loss.to_scalar::<f32>()?;
        Ok((ExecutionResult::new(predicted, vec![value]), loss))
    }

    /// One optimizer step on a batch.
    pub fn train_step(
        &mut self,
        batch: &[&TrainingExample],
    ) -> anyhow::Result<ExecutionResult<Vec<String>>> {
        let (result, loss) = self.forward_batch(batch)?;
        self.optimizer.backward_step(&loss)?;
        Ok(result)
    }

    /// One shuffled pass over `examples`.
    pub fn train_epoch(
        &mut self,
        epoch: usize,
        examples: &[TrainingExample],
    ) -> anyhow::Result<EpochSummary> {
        let order = shuffled_indices(examples.len(), &mut self.rng);
        let ordered: Vec<&TrainingExample> = order.iter().map(|&i| &examples[i]).collect();

        let mut results = Vec::new();
        for (step, batch) in ordered.chunks(self.config.batch_size).enumerate() {
            let result = self.train_step(batch)?;
            debug!(epoch, step, loss = result.losses[0], "train step");
            results.push(result);
        }

        let merged = collect_finished(results, 1);
        let gold: Vec<Vec<String>> = ordered.iter().map(|e| e.labels.clone()).collect();
        Ok(EpochSummary {
            epoch,
            loss: merged.losses[0],
            accuracy: token_accuracy(&merged.outputs, &gold),
        })
    }

    /// Loss and accuracy without updating parameters.
    pub fn evaluate(&self, examples: &[TrainingExample]) -> anyhow::Result<EpochSummary> {
        let refs: Vec<&TrainingExample> = examples.iter().collect();
        let mut results = Vec::new();
        for batch in refs.chunks(self.config.batch_size) {
            results.push(self.forward_batch(batch)?.0);
        }

        let merged = collect_finished(results, 1);
        let gold: Vec<Vec<String>> = examples.iter().map(|e| e.labels.clone()).collect();
        Ok(EpochSummary {
            epoch: 0,
            loss: merged.losses[0],
            accuracy: token_accuracy(&merged.outputs, &gold),
        })
    }

    /// Label unseen sentences.
    pub fn predict(&self, sentences: &[Vec<String>]) -> anyhow::Result<Vec<Vec<String>>> {
        let tokens: Vec<&[String]> = sentences.iter().map(Vec::as_slice).collect();
        let encoded = self.encoder.encode(&tokens, &self.words, &self.device)?;
        let decoded = self.labeler.decode(&encoded)?;
        Ok(self.labeler.labels(&decoded)?)
    }

    /// Score predictions on `examples` with an external metric.
    pub fn score_with(
        &self,
        evaluator: &dyn Evaluator,
        examples: &[TrainingExample],
    ) -> anyhow::Result<f32> {
        let sentences: Vec<Vec<String>> = examples.iter().map(|e| e.tokens.clone()).collect();
        let gold: Vec<Vec<String>> = examples.iter().map(|e| e.labels.clone()).collect();
        let predicted = self.predict(&sentences)?;
        Ok(evaluator.score_batch(&predicted, &gold))
    }

    /// Train for the configured number of epochs.
    pub fn train(&mut self, examples: &[TrainingExample]) -> anyhow::Result<Vec<EpochSummary>> {
        let epochs = self.config.epochs;
        let mut summaries = Vec::with_capacity(epochs);

        for epoch in 1..=epochs {
            let summary = self.train_epoch(epoch, examples)?;
            info!(
                "Epoch {}/{} complete - loss: {:.4}, accuracy: {:.2}%",
                epoch,
                epochs,
                summary.loss,
                summary.accuracy * 100.0
            );
            summaries.push(summary);
        }

        Ok(summaries)
    }
}
