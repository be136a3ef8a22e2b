//! Aggregation of per-batch results across an execution loop.

/// Outputs and losses produced by one executed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult<T> {
    pub outputs: Vec<T>,
    pub losses: Vec<f32>,
}

impl<T> ExecutionResult<T> {
    pub fn new(outputs: Vec<T>, losses: Vec<f32>) -> Self {
        Self { outputs, losses }
    }
}

/// Merge batch results: outputs are concatenated and each loss is summed
/// across batches, then divided by the total number of outputs.
///
/// `num_losses` is the number of named losses the runner tracks. With no
/// outputs the summed losses are returned as they are.
pub fn collect_finished<T>(
    results: Vec<ExecutionResult<T>>,
    num_losses: usize,
) -> ExecutionResult<T> {
    let mut outputs = Vec::new();
    let mut losses_sum = vec![0.0f32; num_losses];

    for result in results {
        outputs.extend(result.outputs);
        for (sum, loss) in losses_sum.iter_mut().zip(result.losses) {
            *sum += loss;
        }
    }

    let losses = if outputs.is_empty() {
        losses_sum
    } else {
        let n = outputs.len() as f32;
        losses_sum.into_iter().map(|l| l / n).collect()
    };

    ExecutionResult { outputs, losses }
}
