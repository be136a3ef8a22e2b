//! # Label Vocabulary
//!
//! Bijective mapping between label strings and integer ids, with the
//! reserved tokens at the low end of the id range, plus the routine that
//! turns a batch of tokenized sentences into padded id and weight matrices.

use std::collections::HashMap;

use candle_core::{Device, Tensor};

use crate::error::{Result, SeqlabError};

/// Padding token, always id 0.
pub const PAD_TOKEN: &str = "<pad>";
/// Sentence start token, always id 1.
pub const START_TOKEN: &str = "<s>";
/// Sentence end token, always id 2.
pub const END_TOKEN: &str = "</s>";
/// Unknown token, always id 3.
pub const UNK_TOKEN: &str = "<unk>";

/// Id of [`PAD_TOKEN`].
pub const PAD_ID: u32 = 0;
/// Id of [`END_TOKEN`].
pub const END_ID: u32 = 2;
/// Id of [`UNK_TOKEN`].
pub const UNK_ID: u32 = 3;

/// Number of ids that never take part in label transitions.
pub const RESERVED_IDS: u32 = 3;

/// Padded, batch-major tensors built from tokenized sentences.
#[derive(Debug, Clone)]
pub struct LabelBatch {
    /// Label ids, shape `[batch, max_len]`, dtype `u32`.
    pub targets: Tensor,
    /// Padding weights, shape `[batch, max_len]`, dtype `f32`.
    pub weights: Tensor,
    /// Number of real tokens per sentence.
    pub lengths: Vec<usize>,
}

/// Fixed label vocabulary.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocabulary {
    /// Build a vocabulary from labels in order of first appearance.
    ///
    /// Reserved tokens always come first; repeated labels and labels that
    /// coincide with a reserved token are ignored.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Self {
            tokens: Vec::new(),
            index: HashMap::new(),
        };

        for reserved in [PAD_TOKEN, START_TOKEN, END_TOKEN, UNK_TOKEN] {
            vocab.push(reserved);
        }

        for label in labels {
            let label = label.as_ref();
            if label.trim().is_empty() {
                return Err(SeqlabError::InvalidVocabulary(
                    "labels must not be empty or whitespace-only".into(),
                ));
            }
            if !vocab.index.contains_key(label) {
                vocab.push(label);
            }
        }

        Ok(vocab)
    }

    fn push(&mut self, token: &str) {
        let id = self.tokens.len() as u32;
        self.tokens.push(token.to_string());
        self.index.insert(token.to_string(), id);
    }

    /// Total number of ids, reserved ones included.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always `false`: the reserved tokens are present in every vocabulary.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Size of the label space seen by the CRF (everything past the reserved ids).
    pub fn num_real_labels(&self) -> usize {
        self.len() - RESERVED_IDS as usize
    }

    /// Id of a label, or `None` if it is not in the vocabulary.
    pub fn get_id(&self, token: &str) -> Option<u32> {
        self.index.get(token).copied()
    }

    /// Id of a label, falling back to [`UNK_ID`].
    pub fn id(&self, token: &str) -> u32 {
        self.get_id(token).unwrap_or(UNK_ID)
    }

    /// Label string of an id.
    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// All labels in id order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Turn tokenized sentences into padded `[batch, max_len]` tensors.
    ///
    /// Sentences are right-padded with [`PAD_ID`] to the longest one in the
    /// batch; weights are 1.0 on real tokens and 0.0 on padding.
    pub fn sentences_to_tensor<S: AsRef<str>>(
        &self,
        sentences: &[Vec<S>],
        device: &Device,
    ) -> Result<LabelBatch> {
        let batch = sentences.len();
        let max_len = sentences.iter().map(Vec::len).max().unwrap_or(0);

        let mut ids = vec![PAD_ID; batch * max_len];
        let mut weights = vec![0.0f32; batch * max_len];
        let mut lengths = Vec::with_capacity(batch);

        for (row, sentence) in sentences.iter().enumerate() {
            for (col, token) in sentence.iter().enumerate() {
                ids[row * max_len + col] = self.id(token.as_ref());
                weights[row * max_len + col] = 1.0;
            }
            lengths.push(sentence.len());
        }

        Ok(LabelBatch {
            targets: Tensor::from_vec(ids, (batch, max_len), device)?,
            weights: Tensor::from_vec(weights, (batch, max_len), device)?,
            lengths,
        })
    }

    /// Map decoded id sequences back to labels, stopping at the end token.
    pub fn vectors_to_sentences(&self, vectors: &[Vec<u32>]) -> Result<Vec<Vec<String>>> {
        vectors
            .iter()
            .map(|ids| {
                ids.iter()
                    .take_while(|&&id| id != END_ID)
                    .map(|&id| {
                        self.token(id)
                            .map(str::to_string)
                            .ok_or_else(|| SeqlabError::UnknownLabel(format!("id {id}")))
                    })
                    .collect()
            })
            .collect()
    }
}
