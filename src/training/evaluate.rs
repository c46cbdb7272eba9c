//! Classification error over a held-out set.

use super::{validate_labels, validate_samples};
use crate::data::{argmax, rows_to_tensor, tensor_to_rows};
use crate::dbn::Dbn;
use crate::errors::DbnError;
use burn::tensor::backend::Backend;

/// Samples pushed through the network per forward pass.
const EVAL_CHUNK: usize = 256;

/// Predicted class (argmax of the network output) for every sample.
pub fn predict<B: Backend>(dbn: &Dbn<B>, samples: &[Vec<f32>]) -> Result<Vec<usize>, DbnError> {
    validate_samples(samples, dbn.input_size())?;
    let device = dbn.device();
    let mut predictions = Vec::with_capacity(samples.len());
    for chunk in samples.chunks(EVAL_CHUNK) {
        let input =
            rows_to_tensor::<B>(chunk.iter().map(Vec::as_slice), dbn.input_size(), &device);
        let outputs = tensor_to_rows(dbn.forward(input))?;
        predictions.extend(outputs.iter().map(|row| argmax(row).unwrap_or(0)));
    }
    Ok(predictions)
}

/// Fraction of samples whose predicted class differs from the label's
/// one-hot index, in `[0, 1]`. The network is not modified.
pub fn evaluate<B: Backend>(
    dbn: &Dbn<B>,
    samples: &[Vec<f32>],
    labels: &[Vec<f32>],
) -> Result<f32, DbnError> {
    validate_samples(samples, dbn.input_size())?;
    validate_labels(labels, samples.len(), dbn.output_size())?;

    let predictions = predict(dbn, samples)?;
    let misclassified = predictions
        .iter()
        .zip(labels)
        .filter(|(predicted, label)| argmax(label) != Some(**predicted))
        .count();
    Ok(misclassified as f32 / samples.len() as f32)
}
