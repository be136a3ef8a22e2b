//! Per-position projection of encoder states and input embeddings to label scores.

use candle_core::Tensor;
use candle_nn::{Init, VarBuilder};
use tracing::debug;

use crate::error::{Result, SeqlabError};

/// Learned linear map from (encoder state, input embedding) to per-label logits.
///
/// `logits = states · W_state + b + embeddings · W_embed`, applied
/// independently at every position of every sequence.
#[derive(Debug, Clone)]
pub struct ScoringLayer {
    state_w: Tensor,
    state_b: Tensor,
    embed_w: Tensor,
    hidden_dim: usize,
    embedding_dim: usize,
    num_labels: usize,
}

/// Glorot-normal init for a `[fan_in, fan_out]` matrix.
fn glorot_normal(fan_in: usize, fan_out: usize) -> Init {
    Init::Randn {
        mean: 0.0,
        stdev: (2.0 / (fan_in + fan_out) as f64).sqrt(),
    }
}

impl ScoringLayer {
    /// Create the layer's parameters under `vb`.
    pub fn new(
        hidden_dim: usize,
        embedding_dim: usize,
        num_labels: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let state_w = vb.get_with_hints(
            (hidden_dim, num_labels),
            "state_to_label_w",
            glorot_normal(hidden_dim, num_labels),
        )?;
        let state_b = vb.get_with_hints(num_labels, "state_to_label_b", Init::Const(0.0))?;
        let embed_w = vb.get_with_hints(
            (embedding_dim, num_labels),
            "emb_to_label_w",
            glorot_normal(embedding_dim, num_labels),
        )?;

        Ok(Self {
            state_w,
            state_b,
            embed_w,
            hidden_dim,
            embedding_dim,
            num_labels,
        })
    }

    /// Number of labels the layer scores.
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Compute logits of shape `[batch, time, num_labels]`.
    ///
    /// `states` is `[batch, time, hidden_dim]` and `embeddings` is
    /// `[batch, time, embedding_dim]`.
    pub fn forward(&self, states: &Tensor, embeddings: &Tensor) -> Result<Tensor> {
        let (batch, time) = self.check_inputs(states, embeddings)?;
        debug!(batch, time, labels = self.num_labels, "scoring layer forward");

        let projected = states
            .reshape((batch * time, self.hidden_dim))?
            .matmul(&self.state_w)?
            .broadcast_add(&self.state_b)?;
        let residual = embeddings
            .reshape((batch * time, self.embedding_dim))?
            .matmul(&self.embed_w)?;

        Ok(projected
            .add(&residual)?
            .reshape((batch, time, self.num_labels))?)
    }

    fn check_inputs(&self, states: &Tensor, embeddings: &Tensor) -> Result<(usize, usize)> {
        let (batch, time, hidden) = match states.dims() {
            &[b, t, h] => (b, t, h),
            other => {
                return Err(SeqlabError::ShapeMismatch {
                    what: "encoder states",
                    expected: format!("[batch, time, {}]", self.hidden_dim),
                    actual: format!("{other:?}"),
                });
            }
        };
        if hidden != self.hidden_dim {
            return Err(SeqlabError::ShapeMismatch {
                what: "encoder states",
                expected: format!("[{batch}, {time}, {}]", self.hidden_dim),
                actual: format!("{:?}", states.dims()),
            });
        }
        if embeddings.dims() != [batch, time, self.embedding_dim] {
            return Err(SeqlabError::ShapeMismatch {
                what: "input embeddings",
                expected: format!("[{batch}, {time}, {}]", self.embedding_dim),
                actual: format!("{:?}", embeddings.dims()),
            });
        }
        Ok((batch, time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn layer(varmap: &VarMap) -> ScoringLayer {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        ScoringLayer::new(4, 3, 5, vb).unwrap()
    }

    #[test]
    fn parameters_have_expected_shapes() {
        let varmap = VarMap::new();
        let layer = layer(&varmap);
        assert_eq!(layer.state_w.dims(), &[4, 5]);
        assert_eq!(layer.embed_w.dims(), &[3, 5]);
        assert_eq!(layer.state_b.to_vec1::<f32>().unwrap(), vec![0.0; 5]);
        assert_eq!(varmap.all_vars().len(), 3);
    }

    #[test]
    fn forward_matches_per_position_matmul() {
        let varmap = VarMap::new();
        let layer = layer(&varmap);
        let dev = Device::Cpu;

        let states = Tensor::randn(0f32, 1.0, (2, 6, 4), &dev).unwrap();
        let embeddings = Tensor::randn(0f32, 1.0, (2, 6, 3), &dev).unwrap();
        let logits = layer.forward(&states, &embeddings).unwrap();
        assert_eq!(logits.dims(), &[2, 6, 5]);

        // position (1, 4) computed on its own
        let s = states.get(1).unwrap().get(4).unwrap().unsqueeze(0).unwrap();
        let e = embeddings.get(1).unwrap().get(4).unwrap().unsqueeze(0).unwrap();
        let expected = s
            .matmul(&layer.state_w)
            .unwrap()
            .add(&e.matmul(&layer.embed_w).unwrap())
            .unwrap()
            .squeeze(0)
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        let actual = logits.get(1).unwrap().get(4).unwrap().to_vec1::<f32>().unwrap();
        for (a, b) in actual.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let varmap = VarMap::new();
        let layer = layer(&varmap);
        let dev = Device::Cpu;

        let states = Tensor::zeros((2, 6, 4), DType::F32, &dev).unwrap();
        let short = Tensor::zeros((2, 5, 3), DType::F32, &dev).unwrap();
        let wide = Tensor::zeros((2, 6, 7), DType::F32, &dev).unwrap();
        let flat = Tensor::zeros((12, 4), DType::F32, &dev).unwrap();

        assert!(layer.forward(&states, &short).is_err());
        assert!(layer.forward(&wide, &short).is_err());
        assert!(layer.forward(&flat, &short).is_err());
    }
}
