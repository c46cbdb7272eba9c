//! Dataset container, light preprocessing and host/tensor conversion helpers.
//!
//! Reading image or label files is left to the caller; samples arrive here as
//! already-decoded `Vec<f32>` rows and labels as one-hot rows.

use crate::errors::DbnError;
use burn::tensor::{Tensor, backend::Backend};

/// Parallel sequences of samples and one-hot labels.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub samples: Vec<Vec<f32>>,
    pub labels: Vec<Vec<f32>>,
}

impl Dataset {
    /// Creates a dataset, checking that both sequences line up and every
    /// sample has the same length.
    pub fn new(samples: Vec<Vec<f32>>, labels: Vec<Vec<f32>>) -> Result<Self, DbnError> {
        if samples.len() != labels.len() {
            return Err(DbnError::DimensionMismatch {
                context: "dataset labels",
                expected: samples.len(),
                actual: labels.len(),
            });
        }
        if let Some(first) = samples.first() {
            check_rows(&samples, first.len(), "dataset sample")?;
        }
        if let Some(first) = labels.first() {
            check_rows(&labels, first.len(), "dataset label")?;
        }
        Ok(Self { samples, labels })
    }

    /// Builds a dataset from class indices, one-hot encoding them over `classes`.
    pub fn from_classes(
        samples: Vec<Vec<f32>>,
        classes: &[usize],
        class_count: usize,
    ) -> Result<Self, DbnError> {
        let labels = classes
            .iter()
            .map(|&class| one_hot(class, class_count))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(samples, labels)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Splits off everything from `at` onwards, e.g. to hold out a test set.
    pub fn split_at(mut self, at: usize) -> (Dataset, Dataset) {
        let at = at.min(self.samples.len());
        let tail_samples = self.samples.split_off(at);
        let tail_labels = self.labels.split_off(at.min(self.labels.len()));
        (
            self,
            Dataset {
                samples: tail_samples,
                labels: tail_labels,
            },
        )
    }
}

/// One-hot encodes `class` over `class_count` classes.
pub fn one_hot(class: usize, class_count: usize) -> Result<Vec<f32>, DbnError> {
    if class >= class_count {
        return Err(DbnError::DimensionMismatch {
            context: "one-hot class index",
            expected: class_count,
            actual: class,
        });
    }
    let mut label = vec![0.0; class_count];
    label[class] = 1.0;
    Ok(label)
}

/// Maps every value to 1.0 if it is strictly above `threshold`, else 0.0.
pub fn binarize(samples: &mut [Vec<f32>], threshold: f32) {
    for value in samples.iter_mut().flat_map(|sample| sample.iter_mut()) {
        *value = if *value > threshold { 1.0 } else { 0.0 };
    }
}

/// Shifts and scales every sample to zero mean and unit variance.
///
/// Constant samples are only centered.
pub fn normalize(samples: &mut [Vec<f32>]) {
    for sample in samples.iter_mut() {
        if sample.is_empty() {
            continue;
        }
        let n = sample.len() as f32;
        let mean = sample.iter().sum::<f32>() / n;
        let variance = sample.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
        let std = variance.sqrt();
        for value in sample.iter_mut() {
            *value -= mean;
            if std > 0.0 {
                *value /= std;
            }
        }
    }
}

/// Index of the largest value, `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

pub(crate) fn check_rows(
    rows: &[Vec<f32>],
    expected: usize,
    context: &'static str,
) -> Result<(), DbnError> {
    match rows.iter().find(|row| row.len() != expected) {
        Some(row) => Err(DbnError::DimensionMismatch {
            context,
            expected,
            actual: row.len(),
        }),
        None => Ok(()),
    }
}

/// Stacks host rows into a `[rows, columns]` tensor.
pub(crate) fn rows_to_tensor<'a, B: Backend>(
    rows: impl IntoIterator<Item = &'a [f32]>,
    columns: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    let flat: Vec<f32> = rows.into_iter().flatten().copied().collect();
    let count = if columns == 0 { 0 } else { flat.len() / columns };
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([count, columns])
}

/// Copies a `[rows, columns]` tensor back into host rows.
pub(crate) fn tensor_to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<Vec<f32>>, DbnError> {
    let [_, columns] = tensor.dims();
    let flat = tensor_to_vec(tensor)?;
    if columns == 0 {
        return Ok(Vec::new());
    }
    Ok(flat.chunks(columns).map(<[f32]>::to_vec).collect())
}

pub(crate) fn tensor_to_vec<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> Result<Vec<f32>, DbnError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| DbnError::Tensor {
            message: format!("{e:?}"),
        })
}

/// Builds a `[rows, columns]` tensor from host-side random draws.
pub(crate) fn random_tensor<B: Backend>(
    shape: [usize; 2],
    device: &B::Device,
    mut draw: impl FnMut() -> f32,
) -> Tensor<B, 2> {
    let values: Vec<f32> = (0..shape[0] * shape[1]).map(|_| draw()).collect();
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape(shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_dataset_rejects_unequal_lengths() {
        let result = Dataset::new(vec![vec![0.0; 3]; 2], vec![vec![1.0, 0.0]]);
        assert!(matches!(
            result,
            Err(DbnError::DimensionMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_dataset_rejects_ragged_samples() {
        let result = Dataset::new(
            vec![vec![0.0; 3], vec![0.0; 4]],
            vec![vec![1.0], vec![1.0]],
        );
        assert!(matches!(result, Err(DbnError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_from_classes_and_split() {
        let dataset =
            Dataset::from_classes(vec![vec![0.5; 2]; 4], &[0, 1, 2, 1], 3).expect("valid");
        assert_eq!(dataset.labels[2], vec![0.0, 0.0, 1.0]);

        let (train, test) = dataset.split_at(3);
        assert_eq!(train.len(), 3);
        assert_eq!(test.len(), 1);
        assert_eq!(test.labels[0], vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_one_hot_out_of_range() {
        assert!(one_hot(3, 3).is_err());
    }

    #[test]
    fn test_binarize_and_normalize() {
        let mut samples = vec![vec![0.1, 0.6, 0.5], vec![2.0, 2.0, 2.0]];
        let mut copy = samples.clone();

        binarize(&mut samples, 0.5);
        assert_eq!(samples[0], vec![0.0, 1.0, 0.0]);
        assert_eq!(samples[1], vec![1.0, 1.0, 1.0]);

        normalize(&mut copy);
        let mean: f32 = copy[0].iter().sum::<f32>() / 3.0;
        let variance: f32 = copy[0].iter().map(|v| v * v).sum::<f32>() / 3.0;
        assert!(mean.abs() < 1e-5);
        assert!((variance - 1.0).abs() < 1e-4);
        // constant sample: centered only
        assert!(copy[1].iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_tensor_row_conversion() {
        let device = <TestBackend as Backend>::Device::default();
        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let tensor: Tensor<TestBackend, 2> =
            rows_to_tensor(rows.iter().map(Vec::as_slice), 3, &device);
        assert_eq!(tensor.dims(), [2, 3]);
        assert_eq!(tensor_to_rows(tensor).expect("conversion"), rows);
    }
}
