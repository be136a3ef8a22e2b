//! Minimal word encoder used to drive the labelers during training.
//!
//! Embeds each token and projects it through a tanh layer; the embeddings
//! double as the residual input of the scoring layer.

use candle_core::{Device, Tensor};
use candle_nn::{Embedding, Linear, Module, VarBuilder};
use seqlab_core::EncoderOutput;

use crate::data::WordVocab;

pub struct EmbeddingEncoder {
    embedding: Embedding,
    projection: Linear,
}

impl EmbeddingEncoder {
    pub fn new(
        vocab_size: usize,
        embedding_dim: usize,
        hidden_dim: usize,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let embedding = candle_nn::embedding(vocab_size, embedding_dim, vb.pp("embedding"))?;
        let projection = candle_nn::linear(embedding_dim, hidden_dim, vb.pp("projection"))?;
        Ok(Self {
            embedding,
            projection,
        })
    }

    /// Encode a batch of tokenized sentences, right-padded to the longest one.
    pub fn encode(
        &self,
        sentences: &[&[String]],
        vocab: &WordVocab,
        device: &Device,
    ) -> candle_core::Result<EncoderOutput> {
        let lengths: Vec<usize> = sentences.iter().map(|s| s.len()).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);

        let mut ids = vec![WordVocab::PAD; sentences.len() * max_len];
        for (row, sentence) in sentences.iter().enumerate() {
            for (col, token) in sentence.iter().enumerate() {
                ids[row * max_len + col] = vocab.encode(token);
            }
        }

        let ids = Tensor::from_vec(ids, (sentences.len(), max_len), device)?;
        let embeddings = self.embedding.forward(&ids)?;
        let states = self.projection.forward(&embeddings)?.tanh()?;

        Ok(EncoderOutput {
            states,
            embeddings,
            lengths,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TrainingExample;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn encodes_padded_batch() {
        let examples = vec![
            TrainingExample::new(vec!["a".into(), "b".into()], vec!["X".into(), "Y".into()]),
            TrainingExample::new(vec!["c".into()], vec!["X".into()]),
        ];
        let vocab = WordVocab::from_examples(&examples);
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let encoder = EmbeddingEncoder::new(vocab.vocab_size(), 4, 6, vb).unwrap();

        let batch: Vec<&[String]> = examples.iter().map(|e| e.tokens.as_slice()).collect();
        let out = encoder.encode(&batch, &vocab, &Device::Cpu).unwrap();

        assert_eq!(out.states.dims(), &[2, 2, 6]);
        assert_eq!(out.embeddings.dims(), &[2, 2, 4]);
        assert_eq!(out.lengths, vec![2, 1]);
    }
}
