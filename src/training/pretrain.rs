//! Greedy layer-wise pretraining.

use super::batches::{BatchSource, epoch_order};
use super::{LayerState, TrainingConfig, validate_samples};
use crate::dbn::{Dbn, forward_through};
use crate::errors::DbnError;
use crate::layers::Rbm;
use burn::tensor::{Tensor, backend::Backend};
use rand::SeedableRng;
use rand::rngs::StdRng;

const STAGE: &str = "pretraining";

/// Progress of a pretraining run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PretrainPhase {
    NotStarted,
    Training { layer: usize, epoch: usize },
    LayerDone { layer: usize },
    /// Every layer ran every configured epoch.
    Complete,
}

/// Outcome of a successful pretraining run.
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainResult {
    /// Mean reconstruction error of every epoch, per layer.
    pub per_layer_errors: Vec<Vec<f32>>,
    pub phase: PretrainPhase,
}

impl PretrainResult {
    /// Last epoch's reconstruction error of every layer.
    pub fn final_errors(&self) -> Vec<f32> {
        self.per_layer_errors
            .iter()
            .map(|errors| errors.last().copied().unwrap_or(0.0))
            .collect()
    }
}

/// Trains every layer in order with contrastive divergence, feeding each one
/// the activations of the layers below it.
///
/// Layers are never revisited. If a layer fails with `NumericInstability` the
/// run stops; layers below keep their trained weights and the failing layer
/// keeps its last finite weights.
pub fn pretrain<B: Backend>(
    dbn: &mut Dbn<B>,
    samples: &[Vec<f32>],
    epochs: usize,
    config: &TrainingConfig,
) -> Result<PretrainResult, DbnError> {
    config.policy.validate()?;
    validate_samples(samples, dbn.input_size())?;

    let device = dbn.device();
    let batch_size = config.policy.batch_size;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let raw: BatchSource<B> =
        BatchSource::new(samples, dbn.input_size(), config.placement, &device);
    let mut per_layer_errors = Vec::with_capacity(dbn.num_layers());
    let mut phase = PretrainPhase::NotStarted;
    log::debug!(
        "Pretraining {} layers on {} samples ({:?})",
        dbn.num_layers(),
        samples.len(),
        phase
    );

    let layer_count = dbn.num_layers();
    for layer_index in 0..layer_count {
        let (lower, upper) = dbn.layers.split_at_mut(layer_index);
        let lower: &[Rbm<B>] = lower;
        let rbm = &mut upper[0];

        // Resident data is pushed through the trained layers once per layer;
        // streamed batches are transformed as they are drawn.
        let transformed = match &raw {
            BatchSource::Resident(data) => {
                Some(BatchSource::Resident(forward_through(lower, data.clone())))
            }
            BatchSource::Streaming { .. } => None,
        };
        let layer_input = |indices: &[usize]| match &transformed {
            Some(resident) => resident.gather(indices, &device),
            None => forward_through(lower, raw.gather(indices, &device)),
        };

        if rbm.wants_visible_bias_init() {
            let rate = activation_rate(
                samples.len(),
                batch_size,
                rbm.visible_size(),
                &device,
                &layer_input,
            );
            rbm.init_visible_biases(rate)?;
        }

        let mut state = LayerState::for_layer(rbm);
        let mut errors = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            phase = PretrainPhase::Training {
                layer: layer_index,
                epoch,
            };
            log::trace!("{phase:?}");
            let order = epoch_order(samples.len(), config.shuffle, &mut rng);
            let mut total = 0.0f64;

            for chunk in order.chunks(batch_size) {
                config.check_stop(STAGE, layer_index, epoch)?;
                let batch = layer_input(chunk);
                let error = rbm
                    .contrastive_update(batch, &config.policy, &mut state, &mut rng)
                    .map_err(|e| {
                        log::warn!("Layer {layer_index} diverged in epoch {epoch}: {e}");
                        e.at(layer_index, epoch)
                    })?;
                total += error as f64 * chunk.len() as f64;
            }

            let epoch_error = (total / samples.len() as f64) as f32;
            errors.push(epoch_error);
            if config.verbose {
                log::info!(
                    "Layer {}/{} epoch {}/{}: reconstruction error = {:.6}",
                    layer_index + 1,
                    layer_count,
                    epoch + 1,
                    epochs,
                    epoch_error
                );
            }
        }

        phase = PretrainPhase::LayerDone { layer: layer_index };
        log::debug!("{phase:?}");
        per_layer_errors.push(errors);
    }

    phase = PretrainPhase::Complete;
    log::debug!("Pretraining {phase:?}");
    Ok(PretrainResult {
        per_layer_errors,
        phase,
    })
}

/// Mean activation of every input unit over the whole dataset.
fn activation_rate<B: Backend>(
    len: usize,
    batch_size: usize,
    columns: usize,
    device: &B::Device,
    layer_input: &impl Fn(&[usize]) -> Tensor<B, 2>,
) -> Tensor<B, 1> {
    let order: Vec<usize> = (0..len).collect();
    let sum = order
        .chunks(batch_size)
        .fold(Tensor::zeros([1, columns], device), |acc, chunk| {
            acc + layer_input(chunk).sum_dim(0)
        });
    sum.div_scalar(len.max(1) as f32).reshape([columns])
}
