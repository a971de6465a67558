use ndarray::{Array, ArrayD, Ix4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Runtime(String),
    #[error("unexpected output shape {0:?}, expected [1, n] or [n] with n > 0")]
    OutputShape(Vec<usize>),
}

/// A loaded classifier. Calls block for the duration of the inference.
pub trait ModelService: Send + Sync + 'static {
    fn class_scores(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError>;
}

/// Flattens a single-image output into its score vector.
pub fn single_batch_scores(output: ArrayD<f32>) -> Result<Vec<f32>, ModelError> {
    let shape = output.shape();
    if !matches!(shape, [n] | [1, n] if *n > 0) {
        return Err(ModelError::OutputShape(shape.to_vec()));
    }

    Ok(output.into_iter().collect())
}

/// Index and value of the highest score. The first maximum wins and NaN never
/// does, unless every score is NaN.
pub fn arg_max(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, row| {
            if row.1 > accum.1 || accum.1.is_nan() {
                row
            } else {
                accum
            }
        })
}
