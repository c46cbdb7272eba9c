//! Unit types for the visible and hidden sides of an RBM layer.

use crate::data::random_tensor;
use burn::tensor::{Tensor, activation, backend::Backend};
use rand::{Rng, rngs::StdRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Supported unit types.
///
/// The unit type decides the mean activation of a layer side, how a training
/// state is drawn from that mean during pretraining, and the derivative used
/// when errors are back-propagated through the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum UnitType {
    /// Logistic units: f(x) = 1 / (1 + exp(-x)), sampled to {0, 1}.
    #[default]
    Binary,
    /// Linear units with unit-variance Gaussian noise when sampled.
    Gaussian,
    /// Rectified linear units: f(x) = max(0, x), never sampled.
    Relu,
    /// Normalized exponential over the layer. Only valid on the last hidden layer.
    Softmax,
}

impl UnitType {
    /// Mean activation for a batch of pre-activations.
    pub fn activate<B: Backend>(&self, pre_activation: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            UnitType::Binary => activation::sigmoid(pre_activation),
            UnitType::Gaussian => pre_activation,
            UnitType::Relu => activation::relu(pre_activation),
            UnitType::Softmax => softmax(pre_activation),
        }
    }

    /// Draws a training-time state from a mean activation.
    pub fn sample<B: Backend>(&self, mean: Tensor<B, 2>, rng: &mut StdRng) -> Tensor<B, 2> {
        match self {
            UnitType::Binary => {
                let uniform =
                    random_tensor::<B>(mean.dims(), &mean.device(), || rng.gen_range(0.0..1.0));
                mean.greater(uniform).float()
            }
            UnitType::Gaussian => {
                let noise = random_tensor::<B>(mean.dims(), &mean.device(), || {
                    StandardNormal.sample(&mut *rng)
                });
                mean + noise
            }
            UnitType::Relu | UnitType::Softmax => mean,
        }
    }

    /// Derivative of the activation, expressed through the activation itself.
    pub fn derivative<B: Backend>(&self, activation: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            UnitType::Binary | UnitType::Softmax => {
                activation.clone() * (activation.neg() + 1.0)
            }
            UnitType::Gaussian => activation.ones_like(),
            UnitType::Relu => activation.greater_elem(0.0).float(),
        }
    }

    /// Whether this unit type may sit on the visible side of a layer.
    pub fn is_valid_visible(&self) -> bool {
        matches!(self, UnitType::Binary | UnitType::Gaussian)
    }

    /// Returns the descriptor name of the unit type.
    pub fn name(&self) -> &'static str {
        match self {
            UnitType::Binary => "BINARY",
            UnitType::Gaussian => "GAUSSIAN",
            UnitType::Relu => "RELU",
            UnitType::Softmax => "SOFTMAX",
        }
    }

    /// Creates a UnitType from a descriptor name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "BINARY" | "SIGMOID" => Some(UnitType::Binary),
            "GAUSSIAN" | "LINEAR" => Some(UnitType::Gaussian),
            "RELU" => Some(UnitType::Relu),
            "SOFTMAX" => Some(UnitType::Softmax),
            _ => None,
        }
    }
}

/// Row-wise softmax with the row maximum subtracted first.
fn softmax<B: Backend>(pre_activation: Tensor<B, 2>) -> Tensor<B, 2> {
    let shifted = pre_activation.clone() - pre_activation.max_dim(1);
    let exp = shifted.exp();
    exp.clone() / exp.sum_dim(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;

    type TestBackend = NdArray;

    fn values(tensor: Tensor<TestBackend, 2>) -> Vec<f32> {
        tensor.to_data().to_vec().unwrap()
    }

    #[test]
    fn test_unit_from_name() {
        assert_eq!(UnitType::from_name("binary"), Some(UnitType::Binary));
        assert_eq!(UnitType::from_name("GAUSSIAN"), Some(UnitType::Gaussian));
        assert_eq!(UnitType::from_name("relu"), Some(UnitType::Relu));
        assert_eq!(UnitType::from_name("Softmax"), Some(UnitType::Softmax));
        assert_eq!(UnitType::from_name("tanh"), None);
        assert_eq!(UnitType::from_name(UnitType::Relu.name()), Some(UnitType::Relu));
    }

    #[test]
    fn test_unit_serde_names() {
        let json = serde_json::to_string(&UnitType::Softmax).unwrap();
        assert_eq!(json, "\"SOFTMAX\"");
        let unit: UnitType = serde_json::from_str("\"GAUSSIAN\"").unwrap();
        assert_eq!(unit, UnitType::Gaussian);
    }

    #[test]
    fn test_activations() {
        let device = <TestBackend as Backend>::Device::default();
        let input = Tensor::<TestBackend, 2>::from_floats([[-1.0, 0.0, 2.0]], &device);

        let binary = values(UnitType::Binary.activate(input.clone()));
        assert!((binary[0] - 0.268_941_4).abs() < 1e-5);
        assert!((binary[1] - 0.5).abs() < 1e-6);

        let relu = values(UnitType::Relu.activate(input.clone()));
        assert_eq!(relu, vec![0.0, 0.0, 2.0]);

        let gaussian = values(UnitType::Gaussian.activate(input));
        assert_eq!(gaussian, vec![-1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_softmax_is_stable_and_normalized() {
        let device = <TestBackend as Backend>::Device::default();
        let input =
            Tensor::<TestBackend, 2>::from_floats([[1000.0, 1001.0], [-5.0, -5.0]], &device);
        let output = values(UnitType::Softmax.activate(input));

        assert!(output.iter().all(|v| v.is_finite()));
        assert!((output[0] + output[1] - 1.0).abs() < 1e-5);
        assert!(output[1] > output[0]);
        assert!((output[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_binary_sampling_is_zero_or_one() {
        let device = <TestBackend as Backend>::Device::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mean = Tensor::<TestBackend, 2>::from_floats([[0.0, 1.0, 0.5, 0.5]], &device);
        let sample = values(UnitType::Binary.sample(mean, &mut rng));

        assert!(sample.iter().all(|&v| v == 0.0 || v == 1.0));
        assert_eq!(sample[0], 0.0);
        assert_eq!(sample[1], 1.0);
    }

    #[test]
    fn test_relu_is_never_sampled() {
        let device = <TestBackend as Backend>::Device::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mean = Tensor::<TestBackend, 2>::from_floats([[0.3, 2.5]], &device);
        assert_eq!(values(UnitType::Relu.sample(mean, &mut rng)), vec![0.3, 2.5]);
    }

    #[test]
    fn test_derivatives() {
        let device = <TestBackend as Backend>::Device::default();
        let activation = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.5, 2.0]], &device);

        let binary = values(UnitType::Binary.derivative(activation.clone()));
        assert!((binary[1] - 0.25).abs() < 1e-6);

        let relu = values(UnitType::Relu.derivative(activation.clone()));
        assert_eq!(relu, vec![0.0, 1.0, 1.0]);

        let gaussian = values(UnitType::Gaussian.derivative(activation));
        assert_eq!(gaussian, vec![1.0, 1.0, 1.0]);
    }
}
