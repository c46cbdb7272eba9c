//! Restricted Boltzmann machine layer.

use crate::errors::DbnError;
use crate::layers::UnitType;
use crate::training::{LayerState, OptimizerPolicy, all_finite};
use burn::tensor::{ElementConversion, Tensor, backend::Backend};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Configuration for an RBM layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbmConfig {
    /// Number of visible (input) units.
    pub visible_size: usize,
    /// Number of hidden (output) units.
    pub hidden_size: usize,
    #[serde(default)]
    pub visible_unit: UnitType,
    #[serde(default)]
    pub hidden_unit: UnitType,
    /// Standard deviation of the zero-mean Gaussian the weights are drawn from.
    #[serde(default = "default_init_std")]
    pub init_std: f32,
    /// Whether pretraining sets the visible biases from the data before the
    /// first epoch (binary visible units only).
    #[serde(default)]
    pub init_visible_bias: bool,
}

fn default_init_std() -> f32 {
    0.01
}

impl RbmConfig {
    /// Creates a binary-binary RbmConfig.
    pub fn new(visible_size: usize, hidden_size: usize) -> Self {
        Self {
            visible_size,
            hidden_size,
            visible_unit: UnitType::Binary,
            hidden_unit: UnitType::Binary,
            init_std: default_init_std(),
            init_visible_bias: false,
        }
    }

    /// Sets the visible unit type.
    pub fn with_visible_unit(mut self, unit: UnitType) -> Self {
        self.visible_unit = unit;
        self
    }

    /// Sets the hidden unit type.
    pub fn with_hidden_unit(mut self, unit: UnitType) -> Self {
        self.hidden_unit = unit;
        self
    }

    /// Sets the weight initialization spread.
    pub fn with_init_std(mut self, std: f32) -> Self {
        self.init_std = std;
        self
    }

    /// Enables data-driven visible bias initialization.
    pub fn with_visible_bias_init(mut self, enabled: bool) -> Self {
        self.init_visible_bias = enabled;
        self
    }

    /// Initializes the layer: Gaussian weights, zero biases.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
        rng: &mut StdRng,
    ) -> Result<Rbm<B>, DbnError> {
        let normal = Normal::new(0.0f32, self.init_std).map_err(|e| {
            DbnError::topology(format!("invalid init_std {}: {e}", self.init_std))
        })?;
        let weights = crate::data::random_tensor::<B>(
            [self.visible_size, self.hidden_size],
            device,
            || normal.sample(&mut *rng),
        );

        Ok(Rbm {
            weights,
            hidden_bias: Tensor::zeros([self.hidden_size], device),
            visible_bias: Tensor::zeros([self.visible_size], device),
            visible_size: self.visible_size,
            hidden_size: self.hidden_size,
            visible_unit: self.visible_unit,
            hidden_unit: self.hidden_unit,
            init_visible_bias: self.init_visible_bias,
        })
    }
}

/// A restricted Boltzmann machine: one layer of a deep belief network.
///
/// Forward activation is `hidden_unit(input @ weights + hidden_bias)` and the
/// reconstruction is `visible_unit(hidden @ weights^T + visible_bias)`.
/// Weights are laid out `[visible_size, hidden_size]`.
#[derive(Debug, Clone)]
pub struct Rbm<B: Backend> {
    weights: Tensor<B, 2>,
    hidden_bias: Tensor<B, 1>,
    visible_bias: Tensor<B, 1>,
    visible_size: usize,
    hidden_size: usize,
    visible_unit: UnitType,
    hidden_unit: UnitType,
    init_visible_bias: bool,
}

impl<B: Backend> Rbm<B> {
    /// Rebuilds a layer from stored parameters.
    pub fn from_parts(
        visible_unit: UnitType,
        hidden_unit: UnitType,
        weights: Tensor<B, 2>,
        hidden_bias: Tensor<B, 1>,
        visible_bias: Tensor<B, 1>,
    ) -> Result<Self, DbnError> {
        let [visible_size, hidden_size] = weights.dims();
        let [hidden_len] = hidden_bias.dims();
        let [visible_len] = visible_bias.dims();
        if hidden_len != hidden_size {
            return Err(DbnError::DimensionMismatch {
                context: "hidden bias",
                expected: hidden_size,
                actual: hidden_len,
            });
        }
        if visible_len != visible_size {
            return Err(DbnError::DimensionMismatch {
                context: "visible bias",
                expected: visible_size,
                actual: visible_len,
            });
        }
        Ok(Self {
            weights,
            hidden_bias,
            visible_bias,
            visible_size,
            hidden_size,
            visible_unit,
            hidden_unit,
            init_visible_bias: false,
        })
    }

    /// Returns the number of visible units of this layer.
    pub fn visible_size(&self) -> usize {
        self.visible_size
    }

    /// Returns the number of hidden units of this layer.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Returns the visible unit type of this layer.
    pub fn visible_unit(&self) -> UnitType {
        self.visible_unit
    }

    /// Returns the hidden unit type of this layer.
    pub fn hidden_unit(&self) -> UnitType {
        self.hidden_unit
    }

    /// Returns the weight matrix, laid out `[visible_size, hidden_size]`.
    pub fn weights(&self) -> &Tensor<B, 2> {
        &self.weights
    }

    /// Returns the hidden bias vector.
    pub fn hidden_bias(&self) -> &Tensor<B, 1> {
        &self.hidden_bias
    }

    /// Returns the visible bias vector.
    pub fn visible_bias(&self) -> &Tensor<B, 1> {
        &self.visible_bias
    }

    pub(crate) fn wants_visible_bias_init(&self) -> bool {
        self.init_visible_bias && self.visible_unit == UnitType::Binary
    }

    /// Mean hidden activation for a `[batch, visible_size]` input.
    pub fn activate(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let pre =
            input.matmul(self.weights.clone()) + self.hidden_bias.clone().unsqueeze::<2>();
        self.hidden_unit.activate(pre)
    }

    /// Mean visible reconstruction for a `[batch, hidden_size]` hidden state.
    pub fn reconstruct(&self, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        let pre = hidden.matmul(self.weights.clone().transpose())
            + self.visible_bias.clone().unsqueeze::<2>();
        self.visible_unit.activate(pre)
    }

    /// Sets `visible_bias_i = ln(p_i / (1 - p_i))` from the per-unit activation
    /// rate of the training data, with `p` clamped to `[0.01, 0.99]`.
    pub fn init_visible_biases(&mut self, activation_rate: Tensor<B, 1>) -> Result<(), DbnError> {
        let [len] = activation_rate.dims();
        if len != self.visible_size {
            return Err(DbnError::DimensionMismatch {
                context: "visible activation rate",
                expected: self.visible_size,
                actual: len,
            });
        }
        let p = activation_rate.clamp(0.01, 0.99);
        self.visible_bias = (p.clone() / (p.neg() + 1.0)).log();
        Ok(())
    }

    /// One contrastive divergence (CD-1) step on a mini-batch.
    ///
    /// Statistics use probabilities; only binary hidden units are sampled to
    /// drive the reconstruction, and Gaussian visible reconstructions get
    /// unit-variance noise. Returns the mean squared reconstruction error.
    ///
    /// The reported layer and epoch of a `NumericInstability` error are zero;
    /// callers fill them in.
    pub fn contrastive_update(
        &mut self,
        batch: Tensor<B, 2>,
        policy: &OptimizerPolicy,
        state: &mut LayerState<B>,
        rng: &mut StdRng,
    ) -> Result<f32, DbnError> {
        let [batch_size, columns] = batch.dims();
        if columns != self.visible_size {
            return Err(DbnError::DimensionMismatch {
                context: "contrastive update input",
                expected: self.visible_size,
                actual: columns,
            });
        }
        if batch_size == 0 {
            return Ok(0.0);
        }
        let scale = 1.0 / batch_size as f32;

        // Positive phase
        let v0 = batch;
        let h0 = self.activate(v0.clone());

        // Negative phase
        let h0_state = self.hidden_unit.sample(h0.clone(), rng);
        let v1_mean = self.reconstruct(h0_state);
        let v1 = match self.visible_unit {
            UnitType::Gaussian => self.visible_unit.sample(v1_mean.clone(), rng),
            _ => v1_mean.clone(),
        };
        let h1 = self.activate(v1.clone());

        let diff = v0.clone() - v1_mean;
        let error: f32 = (diff.clone() * diff).mean().into_scalar().elem();

        let positive = v0.clone().transpose().matmul(h0.clone());
        let negative = v1.clone().transpose().matmul(h1.clone());
        let weight_direction = policy
            .weight_decay
            .apply((positive - negative).mul_scalar(scale), &self.weights);
        let visible_direction = (v0 - v1).mean_dim(0).reshape([self.visible_size]);
        let hidden_direction = (h0 - h1).mean_dim(0).reshape([self.hidden_size]);

        if !error.is_finite() {
            return Err(instability("contrastive divergence"));
        }
        let step = self.compute_step(
            policy,
            state,
            weight_direction,
            hidden_direction,
            Some(visible_direction),
            "contrastive divergence",
        )?;
        self.commit(step, state);
        Ok(error)
    }

    /// One gradient-descent step driven by a back-propagated error.
    ///
    /// `input` is this layer's `[batch, visible_size]` input and `delta` the
    /// loss gradient with respect to its pre-activation. Returns
    /// `delta @ weights^T` computed with the pre-update weights, which the
    /// caller multiplies by the lower layer's activation derivative.
    pub fn backprop_update(
        &mut self,
        input: Tensor<B, 2>,
        delta: Tensor<B, 2>,
        policy: &OptimizerPolicy,
        state: &mut LayerState<B>,
    ) -> Result<Tensor<B, 2>, DbnError> {
        let (step, upstream) = self.backprop_step(input, delta, policy, state)?;
        self.commit(step, state);
        Ok(upstream)
    }

    /// Same as [`Rbm::backprop_update`] but leaves the layer untouched; the
    /// returned step is applied later with [`Rbm::commit`].
    pub(crate) fn backprop_step(
        &self,
        input: Tensor<B, 2>,
        delta: Tensor<B, 2>,
        policy: &OptimizerPolicy,
        state: &LayerState<B>,
    ) -> Result<(PendingStep<B>, Tensor<B, 2>), DbnError> {
        let [batch_size, columns] = input.dims();
        let [delta_rows, delta_columns] = delta.dims();
        if columns != self.visible_size {
            return Err(DbnError::DimensionMismatch {
                context: "backprop input",
                expected: self.visible_size,
                actual: columns,
            });
        }
        if delta_columns != self.hidden_size || delta_rows != batch_size {
            return Err(DbnError::DimensionMismatch {
                context: "backprop delta",
                expected: self.hidden_size,
                actual: delta_columns,
            });
        }
        let scale = 1.0 / batch_size.max(1) as f32;

        let upstream = delta.clone().matmul(self.weights.clone().transpose());
        let gradient = input.transpose().matmul(delta.clone()).mul_scalar(scale);
        let weight_direction = policy.weight_decay.apply(gradient.neg(), &self.weights);
        let hidden_direction = delta.mean_dim(0).reshape([self.hidden_size]).neg();

        let step = self.compute_step(
            policy,
            state,
            weight_direction,
            hidden_direction,
            None,
            "fine-tuning",
        )?;
        Ok((step, upstream))
    }

    /// Computes the new parameters and velocities. Fails unless all of them
    /// are finite.
    fn compute_step(
        &self,
        policy: &OptimizerPolicy,
        state: &LayerState<B>,
        weight_direction: Tensor<B, 2>,
        hidden_direction: Tensor<B, 1>,
        visible_direction: Option<Tensor<B, 1>>,
        stage: &'static str,
    ) -> Result<PendingStep<B>, DbnError> {
        let weights =
            policy.step(self.weights.clone(), state.weights.clone(), weight_direction);
        let hidden_bias = policy.step(
            self.hidden_bias.clone(),
            state.hidden_bias.clone(),
            hidden_direction,
        );
        let visible_bias = visible_direction.map(|direction| {
            policy.step(
                self.visible_bias.clone(),
                state.visible_bias.clone(),
                direction,
            )
        });

        let finite = all_finite(&weights.0)
            && all_finite(&hidden_bias.0)
            && visible_bias.as_ref().is_none_or(|(bias, _)| all_finite(bias));
        if !finite {
            return Err(instability(stage));
        }
        Ok(PendingStep {
            weights,
            hidden_bias,
            visible_bias,
        })
    }

    /// Applies a step produced by [`Rbm::backprop_step`] or a contrastive update.
    pub(crate) fn commit(&mut self, step: PendingStep<B>, state: &mut LayerState<B>) {
        (self.weights, state.weights) = step.weights;
        (self.hidden_bias, state.hidden_bias) = step.hidden_bias;
        if let Some((visible_bias, visible_velocity)) = step.visible_bias {
            self.visible_bias = visible_bias;
            state.visible_bias = visible_velocity;
        }
    }
}

/// Finite `(parameter, velocity)` pairs of one layer, not yet applied.
#[derive(Debug, Clone)]
pub(crate) struct PendingStep<B: Backend> {
    weights: (Tensor<B, 2>, Tensor<B, 2>),
    hidden_bias: (Tensor<B, 1>, Tensor<B, 1>),
    visible_bias: Option<(Tensor<B, 1>, Tensor<B, 1>)>,
}

fn instability(stage: &'static str) -> DbnError {
    DbnError::NumericInstability {
        stage,
        layer: 0,
        epoch: 0,
    }
}
