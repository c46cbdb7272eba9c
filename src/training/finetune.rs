//! Supervised fine-tuning by back-propagation through the whole stack.

use super::batches::{BatchSource, epoch_order};
use super::{
    LayerState, Loss, OptimizerPolicy, TrainingConfig, validate_labels, validate_samples,
};
use crate::dbn::Dbn;
use crate::errors::DbnError;
use crate::layers::Rbm;
use burn::tensor::{Tensor, backend::Backend};
use rand::SeedableRng;
use rand::rngs::StdRng;

const STAGE: &str = "fine-tuning";

/// Outcome of a fine-tuning run.
#[derive(Debug, Clone, PartialEq)]
pub struct FineTuneResult {
    /// Sample-weighted mean training loss of every epoch.
    pub loss_history: Vec<f32>,
    /// Loss of the last epoch, or of the untouched network when no epoch ran.
    pub final_loss: f32,
}

/// Trains every layer jointly as a feed-forward classifier.
///
/// The loss follows the output unit: cross-entropy for softmax outputs, mean
/// squared error otherwise. Mini-batches are reshuffled every epoch from
/// `config.seed`, and momentum velocities persist for the whole run.
pub fn fine_tune<B: Backend>(
    dbn: &mut Dbn<B>,
    samples: &[Vec<f32>],
    labels: &[Vec<f32>],
    epochs: usize,
    config: &TrainingConfig,
) -> Result<FineTuneResult, DbnError> {
    config.policy.validate()?;
    validate_samples(samples, dbn.input_size())?;
    validate_labels(labels, samples.len(), dbn.output_size())?;

    let device = dbn.device();
    let loss = Loss::for_output(dbn.output_unit());
    let inputs: BatchSource<B> =
        BatchSource::new(samples, dbn.input_size(), config.placement, &device);
    let targets: BatchSource<B> =
        BatchSource::new(labels, dbn.output_size(), config.placement, &device);
    let mut states: Vec<LayerState<B>> = dbn.layers.iter().map(LayerState::for_layer).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut loss_history = Vec::with_capacity(epochs);
    let top = dbn.num_layers() - 1;

    for epoch in 0..epochs {
        let order = epoch_order(samples.len(), config.shuffle, &mut rng);
        let mut total = 0.0f64;

        for chunk in order.chunks(config.policy.batch_size) {
            config.check_stop(STAGE, top, epoch)?;
            let input = inputs.gather(chunk, &device);
            let target = targets.gather(chunk, &device);
            let batch_loss = train_batch(
                &mut dbn.layers,
                &mut states,
                input,
                target,
                loss,
                &config.policy,
            )
            .map_err(|e| e.at_epoch(epoch))?;
            total += batch_loss as f64 * chunk.len() as f64;
        }

        let epoch_loss = (total / samples.len() as f64) as f32;
        if !epoch_loss.is_finite() {
            log::warn!("Fine-tuning loss diverged in epoch {epoch}");
            return Err(DbnError::NumericInstability {
                stage: STAGE,
                layer: top,
                epoch,
            });
        }
        loss_history.push(epoch_loss);

        if config.verbose && (epoch % 10 == 0 || epoch + 1 == epochs) {
            log::info!(
                "Epoch {}/{}: loss = {:.6}",
                epoch + 1,
                epochs,
                epoch_loss
            );
        }
    }

    let final_loss = match loss_history.last() {
        Some(&last) => last,
        None => dataset_loss(dbn, &inputs, &targets, loss, config.policy.batch_size),
    };
    Ok(FineTuneResult {
        loss_history,
        final_loss,
    })
}

/// One forward/backward pass over a mini-batch. Returns the batch loss
/// measured before the update.
///
/// Every layer's step is computed before any is applied, so a non-finite
/// step anywhere leaves the whole stack as it was.
fn train_batch<B: Backend>(
    layers: &mut [Rbm<B>],
    states: &mut [LayerState<B>],
    input: Tensor<B, 2>,
    target: Tensor<B, 2>,
    loss: Loss,
    policy: &OptimizerPolicy,
) -> Result<f32, DbnError> {
    let mut activations = Vec::with_capacity(layers.len() + 1);
    activations.push(input);
    for layer in layers.iter() {
        let next = layer.activate(activations[activations.len() - 1].clone());
        activations.push(next);
    }

    let top = layers.len() - 1;
    let output = activations[layers.len()].clone();
    let value = loss.compute(output.clone(), target.clone());
    let mut delta = loss.output_delta(output, target, layers[top].hidden_unit());

    let mut pending = Vec::with_capacity(layers.len());
    for index in (0..layers.len()).rev() {
        let (step, upstream) = layers[index]
            .backprop_step(
                activations[index].clone(),
                delta.clone(),
                policy,
                &states[index],
            )
            .map_err(|e| e.at(index, 0))?;
        pending.push((index, step));
        delta = match index.checked_sub(1) {
            Some(below) => {
                let derivative = layers[below]
                    .hidden_unit()
                    .derivative(activations[index].clone());
                upstream * derivative
            }
            None => upstream,
        };
    }

    for (index, step) in pending {
        layers[index].commit(step, &mut states[index]);
    }
    Ok(value)
}

/// Loss of the current network over every sample.
fn dataset_loss<B: Backend>(
    dbn: &Dbn<B>,
    inputs: &BatchSource<'_, B>,
    targets: &BatchSource<'_, B>,
    loss: Loss,
    batch_size: usize,
) -> f32 {
    let device = dbn.device();
    let len = match inputs {
        BatchSource::Resident(data) => data.dims()[0],
        BatchSource::Streaming { rows, .. } => rows.len(),
    };
    let order: Vec<usize> = (0..len).collect();
    let total: f64 = order
        .chunks(batch_size)
        .map(|chunk| {
            let output = dbn.forward(inputs.gather(chunk, &device));
            let target = targets.gather(chunk, &device);
            loss.compute(output, target) as f64 * chunk.len() as f64
        })
        .sum();
    (total / len.max(1) as f64) as f32
}
