//! # Viterbi Decoding for CRF
//!
//! Implements the Viterbi algorithm for finding the highest-scoring label
//! sequence given unary scores and a label transition matrix.

use crate::error::{Result, SeqlabError};

/// Best label path for one sequence and its unnormalized score.
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiPath {
    /// Label indices in CRF label space, one per position.
    pub tags: Vec<usize>,
    /// Sum of unary and transition scores along `tags`.
    pub score: f32,
}

/// Viterbi decoder for linear-chain CRF label sequences.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
}

impl ViterbiDecoder {
    /// Create a new Viterbi decoder.
    ///
    /// # Arguments
    /// * `num_tags` - Number of labels in the CRF label space
    pub fn new(num_tags: usize) -> Self {
        Self { num_tags }
    }

    /// Number of labels this decoder expects per position.
    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Decode the optimal label sequence.
    ///
    /// # Arguments
    /// * `unary_scores` - Matrix of shape [seq_len, num_tags]
    /// * `transition_matrix` - Matrix of shape [num_tags, num_tags], indexed `[prev][next]`
    ///
    /// # Returns
    /// The best path and its raw score. An empty input yields an empty path
    /// with score 0. Ties are broken towards the lowest label index.
    pub fn decode(
        &self,
        unary_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
    ) -> Result<ViterbiPath> {
        self.validate(unary_scores, transition_matrix)?;

        let seq_len = unary_scores.len();
        if seq_len == 0 {
            return Ok(ViterbiPath {
                tags: Vec::new(),
                score: 0.0,
            });
        }

        // delta[tag] holds the best score of any path ending in `tag` at the current position
        let mut delta = unary_scores[0].clone();
        let mut backptr: Vec<Vec<usize>> = Vec::with_capacity(seq_len - 1);

        for unary in &unary_scores[1..] {
            let mut next = vec![f32::NEG_INFINITY; self.num_tags];
            let mut pointers = vec![0usize; self.num_tags];

            for curr_tag in 0..self.num_tags {
                let mut best_score = f32::NEG_INFINITY;
                let mut best_prev = 0;

                for prev_tag in 0..self.num_tags {
                    let score = delta[prev_tag] + transition_matrix[prev_tag][curr_tag];
                    if score > best_score {
                        best_score = score;
                        best_prev = prev_tag;
                    }
                }

                next[curr_tag] = best_score + unary[curr_tag];
                pointers[curr_tag] = best_prev;
            }

            delta = next;
            backptr.push(pointers);
        }

        let (mut best_tag, mut best_score) = (0, f32::NEG_INFINITY);
        for (tag, &score) in delta.iter().enumerate() {
            if score > best_score {
                best_score = score;
                best_tag = tag;
            }
        }

        let mut tags = Vec::with_capacity(seq_len);
        tags.push(best_tag);
        for pointers in backptr.iter().rev() {
            best_tag = pointers[best_tag];
            tags.push(best_tag);
        }
        tags.reverse();

        Ok(ViterbiPath {
            tags,
            score: best_score,
        })
    }

    /// Score an arbitrary label path under the same model.
    pub fn path_score(
        &self,
        unary_scores: &[Vec<f32>],
        transition_matrix: &[Vec<f32>],
        tags: &[usize],
    ) -> Result<f32> {
        self.validate(unary_scores, transition_matrix)?;
        if tags.len() != unary_scores.len() || tags.iter().any(|&t| t >= self.num_tags) {
            return Err(SeqlabError::ShapeMismatch {
                what: "label path",
                expected: format!("{} tags below {}", unary_scores.len(), self.num_tags),
                actual: format!("{tags:?}"),
            });
        }

        let mut score = 0.0;
        for (pos, &tag) in tags.iter().enumerate() {
            score += unary_scores[pos][tag];
            if pos > 0 {
                score += transition_matrix[tags[pos - 1]][tag];
            }
        }
        Ok(score)
    }

    fn validate(&self, unary_scores: &[Vec<f32>], transition_matrix: &[Vec<f32>]) -> Result<()> {
        if let Some(row) = unary_scores.iter().find(|row| row.len() != self.num_tags) {
            return Err(SeqlabError::ShapeMismatch {
                what: "unary scores",
                expected: format!("{} labels per position", self.num_tags),
                actual: format!("{} labels", row.len()),
            });
        }
        if transition_matrix.len() != self.num_tags
            || transition_matrix.iter().any(|row| row.len() != self.num_tags)
        {
            return Err(SeqlabError::ShapeMismatch {
                what: "transition matrix",
                expected: format!("[{n}, {n}]", n = self.num_tags),
                actual: format!(
                    "{} rows of {:?}",
                    transition_matrix.len(),
                    transition_matrix.first().map(Vec::len)
                ),
            });
        }
        Ok(())
    }
}
