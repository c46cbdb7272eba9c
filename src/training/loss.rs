//! Loss functions for fine-tuning.

use crate::layers::UnitType;
use burn::tensor::{ElementConversion, Tensor, backend::Backend};

/// Supported loss functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    /// Mean Squared Error loss, averaged over every output element.
    Mse,
    /// Categorical cross-entropy, summed over classes and averaged over samples.
    CrossEntropy,
}

impl Loss {
    /// The loss that pairs with an output unit type.
    pub fn for_output(unit: UnitType) -> Self {
        match unit {
            UnitType::Softmax => Loss::CrossEntropy,
            _ => Loss::Mse,
        }
    }

    /// Computes the loss between predictions and targets.
    pub fn compute<B: Backend>(&self, predictions: Tensor<B, 2>, targets: Tensor<B, 2>) -> f32 {
        let value = match self {
            Loss::Mse => {
                let diff = predictions - targets;
                let squared = diff.clone() * diff;
                squared.mean()
            }
            Loss::CrossEntropy => {
                // clamped so a saturated softmax never yields ln(0)
                let epsilon = 1e-7;
                let log_p = predictions.clamp(epsilon, 1.0).log();
                (targets * log_p).sum_dim(1).mean().neg()
            }
        };
        value.into_scalar().elem()
    }

    /// Gradient of the loss with respect to the output layer's pre-activation.
    pub fn output_delta<B: Backend>(
        &self,
        predictions: Tensor<B, 2>,
        targets: Tensor<B, 2>,
        output_unit: UnitType,
    ) -> Tensor<B, 2> {
        match self {
            Loss::CrossEntropy => predictions - targets,
            Loss::Mse => {
                let derivative = output_unit.derivative(predictions.clone());
                (predictions - targets) * derivative
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_loss_for_output() {
        assert_eq!(Loss::for_output(UnitType::Softmax), Loss::CrossEntropy);
        assert_eq!(Loss::for_output(UnitType::Binary), Loss::Mse);
    }

    #[test]
    fn test_mse_loss_nonzero() {
        let device = <TestBackend as Backend>::Device::default();
        let predictions = Tensor::<TestBackend, 2>::from_floats([[1.0], [2.0]], &device);
        let targets = Tensor::<TestBackend, 2>::from_floats([[2.0], [2.0]], &device);

        // MSE = mean((1-2)^2 + (2-2)^2) = 0.5
        let loss = Loss::Mse.compute(predictions, targets);
        assert!((loss - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cross_entropy() {
        let device = <TestBackend as Backend>::Device::default();
        let predictions =
            Tensor::<TestBackend, 2>::from_floats([[0.5, 0.5], [0.9, 0.1]], &device);
        let targets = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [1.0, 0.0]], &device);

        let loss = Loss::CrossEntropy.compute(predictions, targets);
        let expected = -(0.5f32.ln() + 0.9f32.ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn test_cross_entropy_of_saturated_prediction_is_finite() {
        let device = <TestBackend as Backend>::Device::default();
        let predictions = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0]], &device);
        let targets = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0]], &device);

        assert!(Loss::CrossEntropy.compute(predictions, targets).is_finite());
    }

    #[test]
    fn test_output_delta() {
        let device = <TestBackend as Backend>::Device::default();
        let predictions = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.5]], &device);
        let targets = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0]], &device);

        let ce: Vec<f32> = Loss::CrossEntropy
            .output_delta(predictions.clone(), targets.clone(), UnitType::Softmax)
            .to_data()
            .to_vec()
            .unwrap();
        assert_eq!(ce, vec![-0.5, 0.5]);

        let mse: Vec<f32> = Loss::Mse
            .output_delta(predictions, targets, UnitType::Binary)
            .to_data()
            .to_vec()
            .unwrap();
        assert_eq!(mse, vec![-0.125, 0.125]);
    }
}
