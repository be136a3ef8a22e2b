//! Data loading for tab-separated, per-token labeled training data.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A single training example: parallel token and label sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub tokens: Vec<String>,
    pub labels: Vec<String>,
}

impl TrainingExample {
    pub fn new(tokens: Vec<String>, labels: Vec<String>) -> Self {
        Self { tokens, labels }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Parse `token\tlabel` lines; blank lines separate sentences, `#` lines are comments.
pub fn parse_tagged<R: BufRead>(reader: R) -> std::io::Result<Vec<TrainingExample>> {
    let mut examples = Vec::new();
    let mut current_tokens = Vec::new();
    let mut current_labels = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            if !current_tokens.is_empty() {
                examples.push(TrainingExample::new(
                    std::mem::take(&mut current_tokens),
                    std::mem::take(&mut current_labels),
                ));
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if let [token, label] = parts.as_slice() {
            current_tokens.push(token.to_string());
            current_labels.push(label.trim().to_string());
        }
    }

    // Don't forget the last example
    if !current_tokens.is_empty() {
        examples.push(TrainingExample::new(current_tokens, current_labels));
    }

    Ok(examples)
}

/// Load a dataset from a tab-separated file.
pub fn load_tagged_dataset<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<TrainingExample>> {
    parse_tagged(BufReader::new(File::open(path)?))
}

/// Fisher-Yates shuffle of example indices.
pub fn shuffled_indices(len: usize, rng: &mut oorandom::Rand32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    for i in (1..len).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        indices.swap(i, j);
    }
    indices
}

/// Word vocabulary for encoder inputs. Id 0 is padding, id 1 unknown.
#[derive(Debug, Clone)]
pub struct WordVocab {
    word_to_idx: HashMap<String, u32>,
}

impl WordVocab {
    pub const PAD: u32 = 0;
    pub const UNK: u32 = 1;

    pub fn from_examples(examples: &[TrainingExample]) -> Self {
        let mut word_to_idx = HashMap::new();
        for token in examples.iter().flat_map(|e| e.tokens.iter()) {
            let next = word_to_idx.len() as u32 + 2;
            word_to_idx.entry(token.clone()).or_insert(next);
        }
        Self { word_to_idx }
    }

    pub fn encode(&self, token: &str) -> u32 {
        self.word_to_idx.get(token).copied().unwrap_or(Self::UNK)
    }

    pub fn vocab_size(&self) -> usize {
        self.word_to_idx.len() + 2
    }
}
