//! # Labeler Configuration
//!
//! Serializable settings for building a labeling head. Defaults describe a
//! small CRF labeler; values can be overridden from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqlabError};

/// Which labeling head to build on top of the scoring layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelerKind {
    /// Per-token softmax classifier.
    Independent,
    /// Linear-chain conditional random field.
    #[default]
    Crf,
}

impl std::str::FromStr for LabelerKind {
    type Err = SeqlabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "independent" | "softmax" => Ok(LabelerKind::Independent),
            "crf" => Ok(LabelerKind::Crf),
            other => Err(SeqlabError::InvalidConfig(format!(
                "unknown labeler kind {other:?}"
            ))),
        }
    }
}

/// Configuration for a sequence labeler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// Which head to use.
    pub kind: LabelerKind,
    /// Width of the encoder states.
    pub hidden_dim: usize,
    /// Width of the raw input embeddings feeding the residual path.
    pub embedding_dim: usize,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            kind: LabelerKind::Crf,
            hidden_dim: 64,
            embedding_dim: 32,
        }
    }
}

impl LabelerConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the labeling head.
    pub fn with_kind(mut self, kind: LabelerKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the encoder state width.
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Set the input embedding width.
    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero-sized dimensions.
    pub fn validate(&self) -> Result<()> {
        if self.hidden_dim == 0 {
            return Err(SeqlabError::InvalidConfig("hidden_dim must be > 0".into()));
        }
        if self.embedding_dim == 0 {
            return Err(SeqlabError::InvalidConfig(
                "embedding_dim must be > 0".into(),
            ));
        }
        Ok(())
    }
}
