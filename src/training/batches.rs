//! Mini-batch assembly over resident or streamed data.

use super::DataPlacement;
use crate::data::rows_to_tensor;
use burn::tensor::{Int, Tensor, backend::Backend};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Rows a training run draws its mini-batches from.
pub(crate) enum BatchSource<'a, B: Backend> {
    /// All rows materialized as one `[rows, columns]` tensor.
    Resident(Tensor<B, 2>),
    /// Host rows, converted one mini-batch at a time.
    Streaming { rows: &'a [Vec<f32>], columns: usize },
}

impl<'a, B: Backend> BatchSource<'a, B> {
    pub(crate) fn new(
        rows: &'a [Vec<f32>],
        columns: usize,
        placement: DataPlacement,
        device: &B::Device,
    ) -> Self {
        match placement {
            DataPlacement::Resident => BatchSource::Resident(rows_to_tensor(
                rows.iter().map(Vec::as_slice),
                columns,
                device,
            )),
            DataPlacement::Streaming => BatchSource::Streaming { rows, columns },
        }
    }

    /// Rows at `indices`, in that order.
    pub(crate) fn gather(&self, indices: &[usize], device: &B::Device) -> Tensor<B, 2> {
        match self {
            BatchSource::Resident(data) => {
                let indices: Vec<i32> = indices.iter().map(|&i| i as i32).collect();
                let indices = Tensor::<B, 1, Int>::from_ints(indices.as_slice(), device);
                data.clone().select(0, indices)
            }
            BatchSource::Streaming { rows, columns } => rows_to_tensor(
                indices.iter().map(|&i| rows[i].as_slice()),
                *columns,
                device,
            ),
        }
    }
}

/// Sample order for one epoch.
pub(crate) fn epoch_order(len: usize, shuffle: bool, rng: &mut StdRng) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    if shuffle {
        order.shuffle(rng);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;

    type TestBackend = NdArray;

    fn rows() -> Vec<Vec<f32>> {
        vec![vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0, 5.0]]
    }

    #[test]
    fn test_resident_and_streaming_gather_the_same_rows() {
        let device = <TestBackend as Backend>::Device::default();
        let rows = rows();
        let resident: BatchSource<TestBackend> =
            BatchSource::new(&rows, 2, DataPlacement::Resident, &device);
        let streaming: BatchSource<TestBackend> =
            BatchSource::new(&rows, 2, DataPlacement::Streaming, &device);

        let a: Vec<f32> = resident.gather(&[2, 0], &device).to_data().to_vec().unwrap();
        let b: Vec<f32> = streaming.gather(&[2, 0], &device).to_data().to_vec().unwrap();
        assert_eq!(a, vec![4.0, 5.0, 0.0, 1.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_epoch_order_is_seeded_permutation() {
        let mut first = StdRng::seed_from_u64(3);
        let mut second = StdRng::seed_from_u64(3);
        let a = epoch_order(50, true, &mut first);
        let b = epoch_order(50, true, &mut second);

        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_eq!(epoch_order(4, false, &mut first), vec![0, 1, 2, 3]);
    }
}
