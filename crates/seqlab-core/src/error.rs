use thiserror::Error;

/// Errors that can occur during seqlab core operations.
#[derive(Debug, Error)]
pub enum SeqlabError {
    /// The requested operation is not available for this labeler.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Two tensors that must agree on a dimension do not.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Which input was rejected.
        what: &'static str,
        /// The shape the layer expected.
        expected: String,
        /// The shape it was given.
        actual: String,
    },

    /// A sequence length disagrees with the padding of its example.
    #[error("length mismatch in example {example}: {reason}")]
    LengthMismatch {
        /// Position of the example in the batch.
        example: usize,
        /// What was inconsistent.
        reason: String,
    },

    /// The vocabulary could not be built.
    #[error("invalid vocabulary: {0}")]
    InvalidVocabulary(String),

    /// A label id or string outside the vocabulary.
    #[error("unknown label: {0}")]
    UnknownLabel(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading a config or data file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A config file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle ML framework error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for seqlab operations.
pub type Result<T> = std::result::Result<T, SeqlabError>;
