//! # Seqlab Core
//!
//! Per-token sequence labeling on top of an external encoder. A
//! [`SequenceLabeler`] scores every position with a learned projection and
//! then either classifies positions independently (softmax) or jointly with
//! a linear-chain CRF.
//!
//! ## Quick Start
//!
//! ```rust
//! use candle_core::{DType, Device, Tensor};
//! use candle_nn::{VarBuilder, VarMap};
//! use seqlab_core::{EncoderOutput, LabelerConfig, LabelerKind, SequenceLabeler, Vocabulary};
//!
//! let device = Device::Cpu;
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
//!
//! let vocab = Vocabulary::from_labels(["O", "B-PER", "I-PER"]).unwrap();
//! let config = LabelerConfig::new()
//!     .with_kind(LabelerKind::Crf)
//!     .with_hidden_dim(8)
//!     .with_embedding_dim(4);
//! let labeler = SequenceLabeler::new(&config, vocab, vb).unwrap();
//!
//! let encoded = EncoderOutput {
//!     states: Tensor::zeros((1, 3, 8), DType::F32, &device).unwrap(),
//!     embeddings: Tensor::zeros((1, 3, 4), DType::F32, &device).unwrap(),
//!     lengths: vec![3],
//! };
//! let decoded = labeler.decode(&encoded).unwrap();
//! assert_eq!(decoded.labels[0].len(), 3);
//! ```
pub mod config;
pub mod crf;
pub mod error;
pub mod eval;
pub mod labeler;
pub mod vocab;

// Re-export primary API
pub use config::{LabelerConfig, LabelerKind};
pub use crf::{CrfLabeler, ViterbiDecoder, ViterbiPath};
pub use error::{Result, SeqlabError};
pub use eval::{BeerWrapper, Evaluator};
pub use labeler::{
    Decoded, EncoderOutput, IndependentLabeler, LabelerOutput, LabelingHead, ScoringLayer,
    SequenceLabeler,
};
pub use vocab::{LabelBatch, Vocabulary};
