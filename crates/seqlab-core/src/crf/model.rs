//! # Linear-Chain CRF Labeler
//!
//! Adds a learned label-transition matrix on top of the scoring layer.
//! Training maximizes the exact sequence log-likelihood, computed with the
//! forward algorithm in log space; inference runs Viterbi over the same
//! unary + transition scores.
//!
//! Reserved vocabulary ids never enter the CRF: logits are sliced to the
//! real label range and ids are shifted by [`RESERVED_IDS`] on the way in
//! and out.

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Init, VarBuilder};
use tracing::debug;

use crate::crf::viterbi::ViterbiDecoder;
use crate::crf::{from_crf_label, to_crf_label};
use crate::error::{Result, SeqlabError};
use crate::labeler::scoring::ScoringLayer;
use crate::labeler::{Decoded, check_lengths};
use crate::vocab::RESERVED_IDS;

/// CRF labeling head.
#[derive(Debug, Clone)]
pub struct CrfLabeler {
    scoring: ScoringLayer,
    /// `[num_tags, num_tags]`, indexed `[prev][next]`.
    transitions: Tensor,
    decoder: ViterbiDecoder,
}

/// Numerically stable `log(sum(exp(xs)))` along `dim`, removing that dim.
fn log_sum_exp(xs: &Tensor, dim: usize) -> Result<Tensor> {
    let max = xs.max_keepdim(dim)?;
    let summed = xs.broadcast_sub(&max)?.exp()?.sum_keepdim(dim)?.log()?;
    Ok(summed.add(&max)?.squeeze(dim)?)
}

/// `[batch, time]` mask, 1 before each example's length and 0 after.
fn length_mask(lengths: &[usize], time: usize, device: &Device) -> Result<Tensor> {
    let flat: Vec<u8> = lengths
        .iter()
        .flat_map(|&len| (0..time).map(move |t| u8::from(t < len)))
        .collect();
    Ok(Tensor::from_vec(flat, (lengths.len(), time), device)?)
}

impl CrfLabeler {
    /// Create the transition matrix under `vb` for the scoring layer's label range.
    pub fn new(scoring: ScoringLayer, vb: VarBuilder) -> Result<Self> {
        let vocab_size = scoring.num_labels();
        if vocab_size <= RESERVED_IDS as usize {
            return Err(SeqlabError::InvalidVocabulary(format!(
                "CRF needs at least one label past the {RESERVED_IDS} reserved ids, got {vocab_size} ids"
            )));
        }

        let num_tags = vocab_size - RESERVED_IDS as usize;
        let limit = (6.0 / (2 * num_tags) as f64).sqrt();
        let transitions = vb.get_with_hints(
            (num_tags, num_tags),
            "transition_params",
            Init::Uniform {
                lo: -limit,
                up: limit,
            },
        )?;

        Ok(Self {
            scoring,
            transitions,
            decoder: ViterbiDecoder::new(num_tags),
        })
    }

    pub fn scoring(&self) -> &ScoringLayer {
        &self.scoring
    }

    /// Size of the CRF label space.
    pub fn num_tags(&self) -> usize {
        self.decoder.num_tags()
    }

    /// The learned transition scores.
    pub fn transitions(&self) -> &Tensor {
        &self.transitions
    }

    /// Current transition scores as a plain matrix.
    pub fn transition_matrix(&self) -> Result<Vec<Vec<f32>>> {
        Ok(self.transitions.to_dtype(DType::F32)?.to_vec2::<f32>()?)
    }

    /// CRF log-probabilities are not defined per position.
    pub fn logprobs(&self, _logits: &Tensor) -> Result<Tensor> {
        Err(SeqlabError::Unsupported(
            "log-probabilities are not supported by the CRF labeler",
        ))
    }

    /// Slice full-vocabulary logits `[batch, time, vocab]` to the real label range.
    pub fn unary_scores(&self, logits: &Tensor) -> Result<Tensor> {
        let (_, _, vocab) = logits.dims3()?;
        let expected = self.num_tags() + RESERVED_IDS as usize;
        if vocab != expected {
            return Err(SeqlabError::ShapeMismatch {
                what: "logits",
                expected: format!("{expected} labels"),
                actual: format!("{vocab} labels"),
            });
        }
        Ok(logits.narrow(2, RESERVED_IDS as usize, self.num_tags())?)
    }

    /// Log partition function per example, shape `[batch]`.
    ///
    /// `unary` is `[batch, time, num_tags]`. The forward recursion runs over
    /// the whole batch at once; an example stops updating once its length is
    /// reached, and empty examples get 0.
    pub fn log_partition(&self, unary: &Tensor, lengths: &[usize]) -> Result<Tensor> {
        let (batch, time, num_tags) = unary.dims3()?;
        check_lengths(batch, time, lengths)?;
        if batch == 0 || time == 0 {
            return Ok(Tensor::zeros(batch, unary.dtype(), unary.device())?);
        }

        let mask = length_mask(lengths, time, unary.device())?;
        let mut alpha = unary.i((.., 0))?;
        for t in 1..time {
            // scores[b][i][j] = alpha[b][i] + transition[i][j]
            let scores = alpha.unsqueeze(2)?.broadcast_add(&self.transitions)?;
            let next = log_sum_exp(&scores, 1)?.add(&unary.i((.., t))?)?;
            let live = mask
                .i((.., t))?
                .unsqueeze(1)?
                .broadcast_as((batch, num_tags))?
                .contiguous()?;
            alpha = live.where_cond(&next, &alpha)?;
        }

        let log_z = log_sum_exp(&alpha, 1)?;
        Ok(mask.i((.., 0))?.where_cond(&log_z, &log_z.zeros_like()?)?)
    }

    /// Unnormalized score of the given label paths, shape `[batch]`.
    ///
    /// `tags[b]` holds CRF label ids for at least the first `lengths[b]`
    /// positions; anything past the length is ignored.
    pub fn sequence_score(
        &self,
        unary: &Tensor,
        tags: &[Vec<u32>],
        lengths: &[usize],
    ) -> Result<Tensor> {
        let (batch, time, num_tags) = unary.dims3()?;
        check_lengths(batch, time, lengths)?;
        if tags.len() != batch {
            return Err(SeqlabError::ShapeMismatch {
                what: "tag paths",
                expected: format!("{batch} paths"),
                actual: format!("{} paths", tags.len()),
            });
        }
        if batch == 0 || time == 0 {
            return Ok(Tensor::zeros(batch, unary.dtype(), unary.device())?);
        }

        let mut flat = vec![0u32; batch * time];
        for (example, (row, &len)) in tags.iter().zip(lengths).enumerate() {
            if row.len() < len {
                return Err(SeqlabError::LengthMismatch {
                    example,
                    reason: format!("{} tags for length {len}", row.len()),
                });
            }
            if let Some(&bad) = row[..len].iter().find(|&&tag| tag as usize >= num_tags) {
                return Err(SeqlabError::UnknownLabel(format!(
                    "CRF tag {bad} in example {example} outside {num_tags} tags"
                )));
            }
            flat[example * time..example * time + len].copy_from_slice(&row[..len]);
        }

        let device = unary.device();
        let weights = length_mask(lengths, time, device)?.to_dtype(unary.dtype())?;
        let tag_ids = Tensor::from_vec(flat.clone(), (batch, time, 1), device)?;
        let emitted = unary.contiguous()?.gather(&tag_ids, 2)?.squeeze(2)?;
        let mut score = emitted.mul(&weights)?.sum(1)?;

        if time > 1 {
            let pairs: Vec<u32> = flat
                .chunks(time)
                .flat_map(|row| row.windows(2).map(|w| w[0] * num_tags as u32 + w[1]))
                .collect();
            let pairs = Tensor::from_vec(pairs, batch * (time - 1), device)?;
            let transition_score = self
                .transitions
                .flatten_all()?
                .index_select(&pairs, 0)?
                .reshape((batch, time - 1))?
                .mul(&weights.narrow(1, 1, time - 1)?)?
                .sum(1)?;
            score = score.add(&transition_score)?;
        }
        Ok(score)
    }

    /// Per-example log-likelihood of `targets` (full-vocabulary ids), shape `[batch]`.
    ///
    /// Only the first `lengths[b]` positions of example `b` are scored.
    /// Empty sequences have log-likelihood 0.
    pub fn log_likelihood(
        &self,
        logits: &Tensor,
        targets: &Tensor,
        lengths: &[usize],
    ) -> Result<Tensor> {
        let unary = self.unary_scores(logits)?;
        let (batch, time, _) = unary.dims3()?;
        if targets.dims() != [batch, time] {
            return Err(SeqlabError::ShapeMismatch {
                what: "targets",
                expected: format!("[{batch}, {time}]"),
                actual: format!("{:?}", targets.dims()),
            });
        }
        check_lengths(batch, time, lengths)?;
        if batch == 0 || time == 0 {
            return Ok(Tensor::zeros(batch, unary.dtype(), logits.device())?);
        }

        let vocab_size = self.num_tags() + RESERVED_IDS as usize;
        let ids = targets.to_dtype(DType::U32)?.to_vec2::<u32>()?;
        let mut tags = Vec::with_capacity(batch);
        for (example, (row, &len)) in ids.iter().zip(lengths).enumerate() {
            if let Some(&bad) = row[..len].iter().find(|&&id| id as usize >= vocab_size) {
                return Err(SeqlabError::UnknownLabel(format!(
                    "target id {bad} in example {example} outside vocabulary of {vocab_size}"
                )));
            }
            tags.push(row[..len].iter().map(|&id| to_crf_label(id)).collect::<Vec<_>>());
        }

        let score = self.sequence_score(&unary, &tags, lengths)?;
        let log_z = self.log_partition(&unary, lengths)?;
        Ok(score.sub(&log_z)?)
    }

    /// Mean negative log-likelihood over the batch.
    pub fn loss(&self, logits: &Tensor, targets: &Tensor, lengths: &[usize]) -> Result<Tensor> {
        let llh = self.log_likelihood(logits, targets, lengths)?;
        if lengths.is_empty() {
            return Ok(Tensor::zeros((), llh.dtype(), llh.device())?);
        }
        Ok(llh.neg()?.mean_all()?)
    }

    /// Viterbi-decode each example up to its length.
    ///
    /// Returned ids are in vocabulary numbering; scores are raw path scores.
    pub fn decode(&self, logits: &Tensor, lengths: &[usize]) -> Result<Decoded> {
        let unary = self.unary_scores(logits)?;
        let (batch, time, _) = unary.dims3()?;
        check_lengths(batch, time, lengths)?;
        debug!(batch, time, tags = self.num_tags(), "viterbi decode");

        let unary = unary.to_dtype(DType::F32)?.to_vec3::<f32>()?;
        let transitions = self.transition_matrix()?;

        let mut labels = Vec::with_capacity(batch);
        let mut scores = Vec::with_capacity(batch);
        for (example, &len) in lengths.iter().enumerate() {
            let path = self.decoder.decode(&unary[example][..len], &transitions)?;
            labels.push(path.tags.into_iter().map(from_crf_label).collect());
            scores.push(path.score);
        }

        Ok(Decoded {
            labels,
            scores: Some(scores),
        })
    }
}

/// Check that each weight row is 1 before its example's length and 0 from it on.
pub fn check_padding(weights: &Tensor, lengths: &[usize]) -> Result<()> {
    let rows = weights.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    if rows.len() != lengths.len() {
        return Err(SeqlabError::ShapeMismatch {
            what: "padding weights",
            expected: format!("{} rows", lengths.len()),
            actual: format!("{} rows", rows.len()),
        });
    }

    for (example, (row, &len)) in rows.iter().zip(lengths).enumerate() {
        if len > row.len() {
            return Err(SeqlabError::LengthMismatch {
                example,
                reason: format!("length {len} exceeds padded width {}", row.len()),
            });
        }
        if let Some(pos) = row.iter().enumerate().position(|(i, &w)| (i < len) != (w == 1.0)) {
            return Err(SeqlabError::LengthMismatch {
                example,
                reason: format!(
                    "padding weight {} at position {pos} disagrees with length {len}",
                    row[pos]
                ),
            });
        }
    }
    Ok(())
}
