//! # Sequence Labelers
//!
//! A [`SequenceLabeler`] owns a label [`Vocabulary`] and one labeling head
//! chosen at construction: an independent softmax classifier or a
//! linear-chain CRF. Both share the same [`ScoringLayer`] and consume the
//! output of an upstream encoder.

pub mod independent;
pub mod scoring;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use tracing::debug;

use crate::config::{LabelerConfig, LabelerKind};
use crate::crf::CrfLabeler;
use crate::crf::model::check_padding;
use crate::error::{Result, SeqlabError};
use crate::vocab::{LabelBatch, Vocabulary};

pub use independent::IndependentLabeler;
pub use scoring::ScoringLayer;

/// What the upstream encoder hands to a labeler.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// Hidden states, `[batch, time, hidden_dim]`.
    pub states: Tensor,
    /// Raw input embeddings, `[batch, time, embedding_dim]`.
    pub embeddings: Tensor,
    /// True (unpadded) length of each example.
    pub lengths: Vec<usize>,
}

/// Decoded label ids, one `Vec` per example truncated to its length.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub labels: Vec<Vec<u32>>,
    /// Raw Viterbi path scores; only the CRF head produces them.
    pub scores: Option<Vec<f32>>,
}

/// Result of one forward pass.
#[derive(Debug, Clone)]
pub struct LabelerOutput {
    pub logits: Tensor,
    pub decoded: Decoded,
    /// Present when targets were supplied.
    pub loss: Option<Tensor>,
}

/// The labeling head behind a [`SequenceLabeler`].
#[derive(Debug, Clone)]
pub enum LabelingHead {
    Independent(IndependentLabeler),
    Crf(CrfLabeler),
}

/// Scoring layer plus labeling head over a fixed vocabulary.
#[derive(Debug, Clone)]
pub struct SequenceLabeler {
    vocabulary: Vocabulary,
    head: LabelingHead,
    device: Device,
}

pub(crate) fn check_lengths(batch: usize, time: usize, lengths: &[usize]) -> Result<()> {
    if lengths.len() != batch {
        return Err(SeqlabError::ShapeMismatch {
            what: "sequence lengths",
            expected: format!("{batch} entries"),
            actual: format!("{} entries", lengths.len()),
        });
    }
    if let Some((example, &len)) = lengths.iter().enumerate().find(|&(_, &len)| len > time) {
        return Err(SeqlabError::LengthMismatch {
            example,
            reason: format!("length {len} exceeds padded width {time}"),
        });
    }
    Ok(())
}

impl SequenceLabeler {
    /// Build a labeler, creating its parameters under `vb`.
    pub fn new(config: &LabelerConfig, vocabulary: Vocabulary, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let device = vb.device().clone();
        let scoring = ScoringLayer::new(
            config.hidden_dim,
            config.embedding_dim,
            vocabulary.len(),
            vb.clone(),
        )?;

        let head = match config.kind {
            LabelerKind::Independent => LabelingHead::Independent(IndependentLabeler::new(scoring)),
            LabelerKind::Crf => LabelingHead::Crf(CrfLabeler::new(scoring, vb)?),
        };

        Ok(Self {
            vocabulary,
            head,
            device,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn head(&self) -> &LabelingHead {
        &self.head
    }

    pub fn kind(&self) -> LabelerKind {
        match self.head {
            LabelingHead::Independent(_) => LabelerKind::Independent,
            LabelingHead::Crf(_) => LabelerKind::Crf,
        }
    }

    fn scoring(&self) -> &ScoringLayer {
        match &self.head {
            LabelingHead::Independent(head) => head.scoring(),
            LabelingHead::Crf(head) => head.scoring(),
        }
    }

    /// Per-position logits over the full vocabulary, `[batch, time, vocab]`.
    pub fn logits(&self, encoded: &EncoderOutput) -> Result<Tensor> {
        let logits = self.scoring().forward(&encoded.states, &encoded.embeddings)?;
        let (batch, time, _) = logits.dims3()?;
        check_lengths(batch, time, &encoded.lengths)?;
        Ok(logits)
    }

    /// Per-position log-probabilities. Fails for the CRF head.
    pub fn logprobs(&self, logits: &Tensor) -> Result<Tensor> {
        match &self.head {
            LabelingHead::Independent(head) => head.logprobs(logits),
            LabelingHead::Crf(head) => head.logprobs(logits),
        }
    }

    /// Decode precomputed logits.
    pub fn decode_logits(&self, logits: &Tensor, lengths: &[usize]) -> Result<Decoded> {
        let (batch, time, _) = logits.dims3()?;
        check_lengths(batch, time, lengths)?;
        match &self.head {
            LabelingHead::Independent(head) => head.decode(logits, lengths),
            LabelingHead::Crf(head) => head.decode(logits, lengths),
        }
    }

    /// Training loss over precomputed logits.
    ///
    /// The independent head sums weighted token losses; the CRF head averages
    /// sequence negative log-likelihoods and first checks that the padding
    /// weights agree with `lengths`.
    pub fn loss_logits(
        &self,
        logits: &Tensor,
        batch: &LabelBatch,
        lengths: &[usize],
    ) -> Result<Tensor> {
        let (b, time, _) = logits.dims3()?;
        check_lengths(b, time, lengths)?;
        if batch.targets.dims() != [b, time] || batch.weights.dims() != [b, time] {
            return Err(SeqlabError::ShapeMismatch {
                what: "label batch",
                expected: format!("[{b}, {time}]"),
                actual: format!(
                    "targets {:?}, weights {:?}",
                    batch.targets.dims(),
                    batch.weights.dims()
                ),
            });
        }

        match &self.head {
            LabelingHead::Independent(head) => head.loss(logits, &batch.targets, &batch.weights),
            LabelingHead::Crf(head) => {
                check_padding(&batch.weights, lengths)?;
                head.loss(logits, &batch.targets, lengths)
            }
        }
    }

    /// Inference: compute logits and decode them.
    pub fn decode(&self, encoded: &EncoderOutput) -> Result<Decoded> {
        let logits = self.logits(encoded)?;
        self.decode_logits(&logits, &encoded.lengths)
    }

    /// Training objective for one batch.
    pub fn loss(&self, encoded: &EncoderOutput, batch: &LabelBatch) -> Result<Tensor> {
        let logits = self.logits(encoded)?;
        self.loss_logits(&logits, batch, &encoded.lengths)
    }

    /// Full forward pass: logits, decoded labels, and the loss when targets are given.
    pub fn forward(
        &self,
        encoded: &EncoderOutput,
        batch: Option<&LabelBatch>,
    ) -> Result<LabelerOutput> {
        let logits = self.logits(encoded)?;
        debug!(kind = ?self.kind(), dims = ?logits.dims(), "labeler forward");

        let loss = batch
            .map(|batch| self.loss_logits(&logits, batch, &encoded.lengths))
            .transpose()?;
        let decoded = self.decode_logits(&logits, &encoded.lengths)?;

        Ok(LabelerOutput {
            logits,
            decoded,
            loss,
        })
    }

    /// Tensorize target sentences. `None` means inference only.
    pub fn feed<S: AsRef<str>>(&self, sentences: Option<&[Vec<S>]>) -> Result<Option<LabelBatch>> {
        sentences
            .map(|sentences| self.vocabulary.sentences_to_tensor(sentences, &self.device))
            .transpose()
    }

    /// Map decoded ids back to label strings.
    pub fn labels(&self, decoded: &Decoded) -> Result<Vec<Vec<String>>> {
        self.vocabulary.vectors_to_sentences(&decoded.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn vocab() -> Vocabulary {
        Vocabulary::from_labels(["O", "B-LOC", "I-LOC"]).unwrap()
    }

    fn labeler(kind: LabelerKind) -> SequenceLabeler {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = LabelerConfig::new()
            .with_kind(kind)
            .with_hidden_dim(6)
            .with_embedding_dim(4);
        SequenceLabeler::new(&config, vocab(), vb).unwrap()
    }

    fn encoded(lengths: Vec<usize>) -> EncoderOutput {
        let dev = Device::Cpu;
        let batch = lengths.len();
        EncoderOutput {
            states: Tensor::randn(0f32, 1.0, (batch, 3, 6), &dev).unwrap(),
            embeddings: Tensor::randn(0f32, 1.0, (batch, 3, 4), &dev).unwrap(),
            lengths,
        }
    }

    fn targets() -> Vec<Vec<&'static str>> {
        vec![vec!["B-LOC", "I-LOC", "O"], vec!["O", "B-LOC"]]
    }

    #[test]
    fn feed_without_targets_is_inference_only() {
        let labeler = labeler(LabelerKind::Independent);
        assert!(labeler.feed::<&str>(None).unwrap().is_none());

        let batch = labeler.feed(Some(targets().as_slice())).unwrap().unwrap();
        assert_eq!(batch.lengths, vec![3, 2]);
    }

    #[test]
    fn independent_forward_with_targets() {
        let labeler = labeler(LabelerKind::Independent);
        let batch = labeler.feed(Some(targets().as_slice())).unwrap().unwrap();
        let output = labeler.forward(&encoded(vec![3, 2]), Some(&batch)).unwrap();

        assert_eq!(output.logits.dims(), &[2, 3, 7]);
        assert_eq!(output.decoded.labels[0].len(), 3);
        assert_eq!(output.decoded.labels[1].len(), 2);
        assert!(output.decoded.scores.is_none());
        assert!(output.loss.unwrap().to_scalar::<f32>().unwrap() > 0.0);
    }

    #[test]
    fn crf_forward_shifts_labels_into_vocabulary() {
        let labeler = labeler(LabelerKind::Crf);
        let batch = labeler.feed(Some(targets().as_slice())).unwrap().unwrap();
        let output = labeler.forward(&encoded(vec![3, 2]), Some(&batch)).unwrap();

        assert!(matches!(
            labeler.head(),
            LabelingHead::Crf(crf) if crf.num_tags() == labeler.vocabulary().num_real_labels()
        ));
        assert!(output.loss.unwrap().to_scalar::<f32>().unwrap() >= 0.0);
        assert_eq!(output.decoded.scores.as_ref().map(Vec::len), Some(2));
        for id in output.decoded.labels.iter().flatten() {
            assert!(*id >= 3 && (*id as usize) < labeler.vocabulary().len());
        }
        let labels = labeler.labels(&output.decoded).unwrap();
        assert_eq!(labels[1].len(), 2);
    }

    #[test]
    fn crf_rejects_logprobs_but_independent_allows_them() {
        let encoded = encoded(vec![3]);

        let crf = labeler(LabelerKind::Crf);
        let logits = crf.logits(&encoded).unwrap();
        assert!(matches!(
            crf.logprobs(&logits),
            Err(SeqlabError::Unsupported(_))
        ));

        let independent = labeler(LabelerKind::Independent);
        let logits = independent.logits(&encoded).unwrap();
        assert_eq!(independent.logprobs(&logits).unwrap().dims(), &[1, 3, 7]);
    }

    #[test]
    fn crf_loss_rejects_lengths_that_disagree_with_padding() {
        let labeler = labeler(LabelerKind::Crf);
        let batch = labeler.feed(Some(targets().as_slice())).unwrap().unwrap();
        let err = labeler.loss(&encoded(vec![3, 3]), &batch).unwrap_err();
        assert!(matches!(err, SeqlabError::LengthMismatch { example: 1, .. }));
    }

    #[test]
    fn mismatched_batch_is_rejected_before_decoding() {
        let labeler = labeler(LabelerKind::Crf);
        assert!(labeler.decode(&encoded(vec![3, 4])).is_err());

        let mut bad = encoded(vec![3, 2]);
        bad.lengths.pop();
        assert!(labeler.decode(&bad).is_err());
    }

    #[test]
    fn decoding_is_repeatable() {
        for kind in [LabelerKind::Independent, LabelerKind::Crf] {
            let labeler = labeler(kind);
            let encoded = encoded(vec![3, 1]);
            assert_eq!(
                labeler.decode(&encoded).unwrap(),
                labeler.decode(&encoded).unwrap()
            );
        }
    }

    #[test]
    fn labeler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SequenceLabeler>();
    }
}
