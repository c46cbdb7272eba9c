//! Momentum state and the shared parameter step.

use super::{OptimizerPolicy, WeightDecay};
use crate::layers::Rbm;
use burn::tensor::{ElementConversion, Tensor, backend::Backend};

/// Momentum velocities for one layer, shaped like its parameters.
#[derive(Debug, Clone)]
pub struct LayerState<B: Backend> {
    pub(crate) weights: Tensor<B, 2>,
    pub(crate) hidden_bias: Tensor<B, 1>,
    pub(crate) visible_bias: Tensor<B, 1>,
}

impl<B: Backend> LayerState<B> {
    /// Zero velocities for a `visible_size x hidden_size` layer.
    pub fn new(visible_size: usize, hidden_size: usize, device: &B::Device) -> Self {
        Self {
            weights: Tensor::zeros([visible_size, hidden_size], device),
            hidden_bias: Tensor::zeros([hidden_size], device),
            visible_bias: Tensor::zeros([visible_size], device),
        }
    }

    /// Zero velocities matching an existing layer.
    pub fn for_layer(layer: &Rbm<B>) -> Self {
        Self::new(
            layer.visible_size(),
            layer.hidden_size(),
            &layer.weights().device(),
        )
    }
}

impl WeightDecay {
    /// Applies the decay to a step direction for `weights`.
    pub(crate) fn apply<B: Backend>(
        &self,
        direction: Tensor<B, 2>,
        weights: &Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        match self.coefficient() {
            Some(coefficient) if coefficient > 0.0 => {
                direction - weights.clone().mul_scalar(coefficient)
            }
            _ => direction,
        }
    }
}

impl OptimizerPolicy {
    /// `velocity = momentum * velocity + learning_rate * direction`, then
    /// `param + velocity`. Returns the new parameter and velocity without
    /// committing either.
    pub(crate) fn step<B: Backend, const D: usize>(
        &self,
        param: Tensor<B, D>,
        velocity: Tensor<B, D>,
        direction: Tensor<B, D>,
    ) -> (Tensor<B, D>, Tensor<B, D>) {
        let scaled = direction.mul_scalar(self.learning_rate);
        let velocity = match self.momentum {
            Some(momentum) if momentum > 0.0 => velocity.mul_scalar(momentum) + scaled,
            _ => scaled,
        };
        (param + velocity.clone(), velocity)
    }
}

/// True when every element is finite.
pub(crate) fn all_finite<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> bool {
    let nan_count: i64 = tensor.clone().is_nan().int().sum().into_scalar().elem();
    if nan_count > 0 {
        return false;
    }
    let largest: f32 = tensor.clone().abs().max().into_scalar().elem();
    largest.is_finite()
}
