//! Optimizer policy and per-run training configuration.

use crate::errors::DbnError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Weight regularization applied to the weight matrix (never to biases).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeightDecay {
    #[default]
    None,
    /// Subtracts `coefficient * W` from every weight step direction.
    L2(f32),
}

impl WeightDecay {
    /// Returns the L2 coefficient, or `None` when decay is off.
    pub fn coefficient(&self) -> Option<f32> {
        match self {
            WeightDecay::None => None,
            WeightDecay::L2(coefficient) => Some(*coefficient),
        }
    }
}

/// Numeric behavior shared by pretraining and fine-tuning.
///
/// Has no `Default`: every run states its learning rate and batch size
/// explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerPolicy {
    /// Step size, must be positive.
    pub learning_rate: f32,
    /// Fraction of the previous step retained, in `[0, 1)`. `None` disables momentum.
    pub momentum: Option<f32>,
    /// Weight regularization.
    pub weight_decay: WeightDecay,
    /// Samples per mini-batch. The last batch of an epoch may be shorter.
    pub batch_size: usize,
}

impl OptimizerPolicy {
    /// Creates a policy without momentum or weight decay.
    pub fn new(learning_rate: f32, batch_size: usize) -> Self {
        Self {
            learning_rate,
            momentum: None,
            weight_decay: WeightDecay::None,
            batch_size,
        }
    }

    /// Enables momentum.
    pub fn momentum(mut self, momentum: f32) -> Self {
        self.momentum = Some(momentum);
        self
    }

    /// Sets the weight decay.
    pub fn weight_decay(mut self, weight_decay: WeightDecay) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the learning rate.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Checks every field is in range.
    pub fn validate(&self) -> Result<(), DbnError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(DbnError::invalid_policy(format!(
                "learning rate must be positive and finite, got {}",
                self.learning_rate
            )));
        }
        if let Some(momentum) = self.momentum {
            if !(0.0..1.0).contains(&momentum) {
                return Err(DbnError::invalid_policy(format!(
                    "momentum must be in [0, 1), got {momentum}"
                )));
            }
        }
        if let Some(coefficient) = self.weight_decay.coefficient() {
            if !(coefficient.is_finite() && coefficient >= 0.0) {
                return Err(DbnError::invalid_policy(format!(
                    "weight decay must be non-negative, got {coefficient}"
                )));
            }
        }
        if self.batch_size == 0 {
            return Err(DbnError::invalid_policy("batch size must be at least 1"));
        }
        Ok(())
    }
}

/// Where the training data lives while a run is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataPlacement {
    /// The whole dataset (and, during pretraining, each layer's transformed
    /// input) is materialized as a single tensor.
    #[default]
    Resident,
    /// Only the current mini-batch is built, and it is pushed through the
    /// already-trained layers on demand.
    Streaming,
}

/// Cooperative cancellation flag, checked between mini-batches.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that running training stops at the next mini-batch boundary.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Configuration for one pretraining or fine-tuning run.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Numeric policy for every update in the run.
    pub policy: OptimizerPolicy,
    /// Seed for shuffling and stochastic unit sampling.
    pub seed: u64,
    /// Whether to reshuffle the sample order every epoch.
    pub shuffle: bool,
    /// Memory footprint trade-off.
    pub placement: DataPlacement,
    /// Whether to log progress at info level.
    pub verbose: bool,
    /// Optional cancellation flag.
    pub stop: Option<StopSignal>,
}

impl TrainingConfig {
    /// Creates a run configuration around an explicit policy.
    pub fn new(policy: OptimizerPolicy) -> Self {
        Self {
            policy,
            seed: 42,
            shuffle: true,
            placement: DataPlacement::Resident,
            verbose: false,
            stop: None,
        }
    }

    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets whether samples are reshuffled each epoch.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Sets the data placement.
    pub fn placement(mut self, placement: DataPlacement) -> Self {
        self.placement = placement;
        self
    }

    /// Sets whether to log progress.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Attaches a stop signal.
    pub fn stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub(crate) fn check_stop(
        &self,
        stage: &'static str,
        layer: usize,
        epoch: usize,
    ) -> Result<(), DbnError> {
        match &self.stop {
            Some(stop) if stop.is_stopped() => Err(DbnError::Cancelled {
                stage,
                layer,
                epoch,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_builder() {
        let policy = OptimizerPolicy::new(0.1, 25)
            .momentum(0.9)
            .weight_decay(WeightDecay::L2(0.0002));

        assert!((policy.learning_rate - 0.1).abs() < 1e-10);
        assert_eq!(policy.momentum, Some(0.9));
        assert_eq!(policy.weight_decay.coefficient(), Some(0.0002));
        assert_eq!(policy.batch_size, 25);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        let invalid = [
            OptimizerPolicy::new(0.0, 10),
            OptimizerPolicy::new(f32::NAN, 10),
            OptimizerPolicy::new(0.1, 0),
            OptimizerPolicy::new(0.1, 10).momentum(1.0),
            OptimizerPolicy::new(0.1, 10).momentum(-0.1),
            OptimizerPolicy::new(0.1, 10).weight_decay(WeightDecay::L2(-1.0)),
        ];
        for policy in invalid {
            assert!(
                matches!(policy.validate(), Err(DbnError::InvalidPolicy { .. })),
                "{policy:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_training_config_builder() {
        let config = TrainingConfig::new(OptimizerPolicy::new(0.05, 10))
            .seed(7)
            .shuffle(false)
            .placement(DataPlacement::Streaming)
            .verbose(true);

        assert_eq!(config.seed, 7);
        assert!(!config.shuffle);
        assert_eq!(config.placement, DataPlacement::Streaming);
        assert!(config.verbose);
        assert!(config.check_stop("test", 0, 0).is_ok());
    }

    #[test]
    fn test_stop_signal_cancels() {
        let stop = StopSignal::new();
        let config = TrainingConfig::new(OptimizerPolicy::new(0.05, 10)).stop_signal(stop.clone());
        stop.stop();

        assert!(matches!(
            config.check_stop("pretraining", 1, 3),
            Err(DbnError::Cancelled {
                layer: 1,
                epoch: 3,
                ..
            })
        ));
    }
}
