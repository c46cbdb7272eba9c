//! Training engines for deep belief networks.
//!
//! This module provides:
//! - Greedy layer-wise pretraining with contrastive divergence
//! - Supervised fine-tuning by back-propagation
//! - The optimizer policy and run configuration shared by both
//! - Classification error evaluation

mod batches;
mod config;
mod evaluate;
mod finetune;
mod loss;
mod optimizer;
mod pretrain;

pub use config::{DataPlacement, OptimizerPolicy, StopSignal, TrainingConfig, WeightDecay};
pub use evaluate::{evaluate, predict};
pub use finetune::{FineTuneResult, fine_tune};
pub use loss::Loss;
pub use optimizer::LayerState;
pub use pretrain::{PretrainPhase, PretrainResult, pretrain};

pub(crate) use optimizer::all_finite;

use crate::data::check_rows;
use crate::errors::DbnError;

pub(crate) fn validate_samples(samples: &[Vec<f32>], input_size: usize) -> Result<(), DbnError> {
    if samples.is_empty() {
        return Err(DbnError::EmptyDataset);
    }
    check_rows(samples, input_size, "sample")
}

pub(crate) fn validate_labels(
    labels: &[Vec<f32>],
    sample_count: usize,
    output_size: usize,
) -> Result<(), DbnError> {
    if labels.len() != sample_count {
        return Err(DbnError::DimensionMismatch {
            context: "label count",
            expected: sample_count,
            actual: labels.len(),
        });
    }
    check_rows(labels, output_size, "label")
}
