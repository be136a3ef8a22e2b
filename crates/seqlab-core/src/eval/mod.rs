pub mod beer;

pub use beer::BeerWrapper;

/// A metric over decoded and reference token sequences.
pub trait Evaluator {
    /// Display name of the metric.
    fn name(&self) -> &str;

    /// Score a batch of hypotheses against their references.
    fn score_batch(&self, hypotheses: &[Vec<String>], references: &[Vec<String>]) -> f32;
}
