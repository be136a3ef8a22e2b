//! Softmax labeler: every position is classified on its own.

use candle_core::{D, DType, Tensor};
use candle_nn::ops::log_softmax;

use crate::error::{Result, SeqlabError};
use crate::labeler::{Decoded, check_lengths};
use crate::labeler::scoring::ScoringLayer;

/// Per-token classifier over the full vocabulary.
#[derive(Debug, Clone)]
pub struct IndependentLabeler {
    scoring: ScoringLayer,
}

impl IndependentLabeler {
    pub fn new(scoring: ScoringLayer) -> Self {
        Self { scoring }
    }

    pub fn scoring(&self) -> &ScoringLayer {
        &self.scoring
    }

    /// Log-softmax over the label axis.
    pub fn logprobs(&self, logits: &Tensor) -> Result<Tensor> {
        Ok(log_softmax(logits, D::Minus1)?)
    }

    /// Argmax label per position, truncated to each example's length.
    pub fn decode(&self, logits: &Tensor, lengths: &[usize]) -> Result<Decoded> {
        let (batch, time, _) = logits.dims3()?;
        check_lengths(batch, time, lengths)?;
        let best = logits.argmax(D::Minus1)?.to_vec2::<u32>()?;
        let labels = best
            .into_iter()
            .zip(lengths)
            .map(|(mut row, &len)| {
                row.truncate(len);
                row
            })
            .collect();

        Ok(Decoded {
            labels,
            scores: None,
        })
    }

    /// Sum over all real positions of the token-level cross-entropy.
    ///
    /// `targets` is `[batch, time]` label ids and `weights` the matching
    /// padding mask; padded positions are multiplied by 0.
    pub fn loss(&self, logits: &Tensor, targets: &Tensor, weights: &Tensor) -> Result<Tensor> {
        let (batch, time, num_labels) = logits.dims3()?;
        for (what, t) in [("targets", targets), ("weights", weights)] {
            if t.dims() != [batch, time] {
                return Err(SeqlabError::ShapeMismatch {
                    what,
                    expected: format!("[{batch}, {time}]"),
                    actual: format!("{:?}", t.dims()),
                });
            }
        }

        let targets = targets.to_dtype(DType::U32)?;
        if let Some(&bad) = targets
            .flatten_all()?
            .to_vec1::<u32>()?
            .iter()
            .find(|&&id| id as usize >= num_labels)
        {
            return Err(SeqlabError::UnknownLabel(format!(
                "target id {bad} outside vocabulary of {num_labels}"
            )));
        }

        let picked = self
            .logprobs(logits)?
            .gather(&targets.unsqueeze(D::Minus1)?.contiguous()?, D::Minus1)?
            .squeeze(D::Minus1)?;
        let weights = weights.to_dtype(picked.dtype())?;

        Ok(picked.neg()?.mul(&weights)?.sum_all()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::{VarBuilder, VarMap};

    fn labeler() -> IndependentLabeler {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        IndependentLabeler::new(ScoringLayer::new(2, 2, 4, vb).unwrap())
    }

    fn logits() -> Tensor {
        Tensor::new(
            &[
                [[0.5f32, 2.0, -1.0, 0.0], [1.0, 0.0, 0.0, 3.0], [0.2, 0.1, 0.4, 0.3]],
                [[0.0f32, 0.0, 5.0, 0.0], [1.5, 1.0, 0.0, 0.0], [2.0, 0.0, 0.0, 1.0]],
            ],
            &Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn logprobs_are_normalized() {
        let lp = labeler().logprobs(&logits()).unwrap();
        let sums = lp.exp().unwrap().sum(D::Minus1).unwrap().to_vec2::<f32>().unwrap();
        for row in sums {
            for s in row {
                assert!((s - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn decode_takes_argmax_and_respects_lengths() {
        let labeler = labeler();
        let decoded = labeler.decode(&logits(), &[3, 2]).unwrap();
        assert_eq!(decoded.labels, vec![vec![1, 3, 2], vec![2, 0]]);
        assert!(decoded.scores.is_none());

        let again = labeler.decode(&logits(), &[3, 2]).unwrap();
        assert_eq!(decoded, again);
    }

    #[test]
    fn decode_rejects_mismatched_lengths() {
        let labeler = labeler();
        let logits = logits();

        let short = labeler.decode(&logits, &[2]);
        assert!(matches!(short, Err(SeqlabError::ShapeMismatch { .. })));

        let too_long = labeler.decode(&logits, &[9, 1]);
        assert!(matches!(
            too_long,
            Err(SeqlabError::LengthMismatch { example: 0, .. })
        ));
    }

    #[test]
    fn loss_matches_manual_cross_entropy() {
        let labeler = labeler();
        let logits = logits();
        let targets = Tensor::new(&[[1u32, 3, 0], [2, 0, 0]], &Device::Cpu).unwrap();
        let weights = Tensor::new(&[[1f32, 1.0, 1.0], [1.0, 0.0, 0.0]], &Device::Cpu).unwrap();

        let loss = labeler
            .loss(&logits, &targets, &weights)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();

        let lp = labeler.logprobs(&logits).unwrap().to_vec3::<f32>().unwrap();
        let expected = -(lp[0][0][1] + lp[0][1][3] + lp[0][2][0] + lp[1][0][2]);
        assert!((loss - expected).abs() < 1e-4);
        assert!(loss >= 0.0);
    }

    #[test]
    fn padding_does_not_change_loss() {
        let labeler = labeler();
        let logits = logits();
        let weights = Tensor::new(&[[1f32, 1.0, 0.0], [1.0, 0.0, 0.0]], &Device::Cpu).unwrap();
        let clean = Tensor::new(&[[1u32, 3, 0], [2, 0, 0]], &Device::Cpu).unwrap();
        let garbage = Tensor::new(&[[1u32, 3, 2], [2, 3, 1]], &Device::Cpu).unwrap();

        let a = labeler.loss(&logits, &clean, &weights).unwrap().to_scalar::<f32>().unwrap();
        let b = labeler.loss(&logits, &garbage, &weights).unwrap().to_scalar::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn loss_rejects_bad_shapes_and_ids() {
        let labeler = labeler();
        let logits = logits();
        let weights = Tensor::ones((2, 3), DType::F32, &Device::Cpu).unwrap();
        let short = Tensor::zeros((2, 2), DType::U32, &Device::Cpu).unwrap();
        let out_of_range = Tensor::new(&[[9u32, 0, 0], [0, 0, 0]], &Device::Cpu).unwrap();

        assert!(labeler.loss(&logits, &short, &weights).is_err());
        assert!(labeler.loss(&logits, &out_of_range, &weights).is_err());
    }
}
