//! Dbn - the stacked RBM container.
//!
//! A [`Dbn`] is an ordered stack of [`Rbm`] layers where every layer's hidden
//! size equals the next layer's visible size. It is built from a [`DbnConfig`]
//! topology descriptor, trained with [`crate::training`], and can be saved to
//! and loaded from a versioned JSON layout.

use crate::data::{rows_to_tensor, tensor_to_rows, tensor_to_vec};
use crate::errors::DbnError;
use crate::layers::{Rbm, RbmConfig, UnitType};
use crate::training::{self, PretrainResult, TrainingConfig};
use burn::tensor::{Tensor, backend::Backend};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Version written into, and required from, exported networks.
pub const FORMAT_VERSION: u32 = 1;

/// Topology descriptor for a deep belief network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbnConfig {
    /// Input size used by [`DbnConfig::rbm`] for the first layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_size: Option<usize>,
    /// Layer configurations, bottom first.
    pub layers: Vec<RbmConfig>,
}

impl DbnConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration whose first layer reads `size` inputs.
    pub fn with_input_size(size: usize) -> Self {
        Self {
            input_size: Some(size),
            layers: Vec::new(),
        }
    }

    /// Parses a JSON topology descriptor.
    pub fn from_json(json: &str) -> Result<Self, DbnError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Appends a fully specified layer.
    pub fn layer(mut self, config: RbmConfig) -> Self {
        self.layers.push(config);
        self
    }

    /// Appends a layer with binary visible units fed by the previous layer.
    pub fn rbm(mut self, hidden_size: usize, hidden_unit: UnitType) -> Self {
        let visible_size = match self.layers.last() {
            Some(last) => last.hidden_size,
            None => self.input_size.unwrap_or(0),
        };
        self.layers
            .push(RbmConfig::new(visible_size, hidden_size).with_hidden_unit(hidden_unit));
        self
    }

    /// Checks the layer chain without allocating anything.
    pub fn validate(&self) -> Result<(), DbnError> {
        validate_topology(self.layers.iter().map(|c| {
            (c.visible_size, c.hidden_size, c.visible_unit, c.hidden_unit)
        }))
    }

    /// Validates the topology and initializes every layer.
    pub fn build<B: Backend>(&self, device: &B::Device, seed: u64) -> Result<Dbn<B>, DbnError> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let layers = self
            .layers
            .iter()
            .map(|config| config.init(device, &mut rng))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Dbn { layers })
    }
}

/// Structural rules every stack obeys.
fn validate_topology(
    layers: impl ExactSizeIterator<Item = (usize, usize, UnitType, UnitType)>,
) -> Result<(), DbnError> {
    let count = layers.len();
    if count == 0 {
        return Err(DbnError::topology("network has no layers"));
    }
    let mut previous_hidden: Option<usize> = None;
    for (index, (visible, hidden, visible_unit, hidden_unit)) in layers.enumerate() {
        if visible == 0 || hidden == 0 {
            return Err(DbnError::topology(format!(
                "layer {index} has a zero dimension ({visible} -> {hidden})"
            )));
        }
        if let Some(expected) = previous_hidden {
            if expected != visible {
                return Err(DbnError::topology(format!(
                    "layer {index} expects {visible} inputs but layer {} produces {expected}",
                    index - 1
                )));
            }
        }
        if !visible_unit.is_valid_visible() {
            return Err(DbnError::topology(format!(
                "layer {index} cannot use {} visible units",
                visible_unit.name()
            )));
        }
        if hidden_unit == UnitType::Softmax && index + 1 != count {
            return Err(DbnError::topology(format!(
                "softmax hidden units are only allowed on the last layer, found on layer {index}"
            )));
        }
        previous_hidden = Some(hidden);
    }
    Ok(())
}

/// Pushes a batch through `layers` in order. An empty slice is the identity.
pub(crate) fn forward_through<B: Backend>(layers: &[Rbm<B>], input: Tensor<B, 2>) -> Tensor<B, 2> {
    layers
        .iter()
        .fold(input, |activation, layer| layer.activate(activation))
}

/// A deep belief network: an ordered, fixed stack of RBM layers.
#[derive(Debug, Clone)]
pub struct Dbn<B: Backend> {
    pub(crate) layers: Vec<Rbm<B>>,
}

impl<B: Backend> Dbn<B> {
    /// Creates a new configuration builder.
    pub fn new_config() -> DbnConfig {
        DbnConfig::new()
    }

    /// Builds a stack from existing layers, applying the same topology rules
    /// as [`DbnConfig::build`].
    pub fn from_layers(layers: Vec<Rbm<B>>) -> Result<Self, DbnError> {
        validate_topology(layers.iter().map(|l| {
            (l.visible_size(), l.hidden_size(), l.visible_unit(), l.hidden_unit())
        }))?;
        Ok(Self { layers })
    }

    /// Forward pass through every layer. Pure with respect to the weights.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        forward_through(&self.layers, input)
    }

    /// Output of layers `0..=layer_index`, i.e. the training input of layer
    /// `layer_index + 1`. Indices past the top are clamped to the last layer.
    pub fn forward_all(&self, layer_index: usize, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let end = (layer_index + 1).min(self.layers.len());
        forward_through(&self.layers[..end], input)
    }

    /// Forward pass for a single host-side sample.
    pub fn forward_sample(&self, sample: &[f32]) -> Result<Vec<f32>, DbnError> {
        if sample.len() != self.input_size() {
            return Err(DbnError::DimensionMismatch {
                context: "sample",
                expected: self.input_size(),
                actual: sample.len(),
            });
        }
        let input = rows_to_tensor::<B>([sample], sample.len(), &self.device());
        let output = tensor_to_rows(self.forward(input))?;
        Ok(output.into_iter().next().unwrap_or_default())
    }

    /// Returns the input size of the first layer.
    pub fn input_size(&self) -> usize {
        self.layers.first().map(|l| l.visible_size()).unwrap_or(0)
    }

    /// Returns the output size of the last layer.
    pub fn output_size(&self) -> usize {
        self.layers.last().map(|l| l.hidden_size()).unwrap_or(0)
    }

    /// Returns the hidden unit type of the last layer.
    pub fn output_unit(&self) -> UnitType {
        self.layers
            .last()
            .map(|l| l.hidden_unit())
            .unwrap_or_default()
    }

    /// Returns the number of layers.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Returns the layers, bottom first.
    pub fn layers(&self) -> &[Rbm<B>] {
        &self.layers
    }

    /// Returns the layer at `index`, if any.
    pub fn layer(&self, index: usize) -> Option<&Rbm<B>> {
        self.layers.get(index)
    }

    /// Device the parameters live on.
    pub fn device(&self) -> B::Device {
        self.layers
            .first()
            .map(|l| l.weights().device())
            .unwrap_or_default()
    }

    /// Greedy layer-wise pretraining. See [`training::pretrain`].
    pub fn pretrain(
        &mut self,
        samples: &[Vec<f32>],
        epochs: usize,
        config: &TrainingConfig,
    ) -> Result<PretrainResult, DbnError> {
        training::pretrain(self, samples, epochs, config)
    }

    /// Supervised fine-tuning; returns the final epoch's mean training loss.
    /// The batch size comes from `config.policy`. See [`training::fine_tune`].
    pub fn fine_tune(
        &mut self,
        samples: &[Vec<f32>],
        labels: &[Vec<f32>],
        epochs: usize,
        config: &TrainingConfig,
    ) -> Result<f32, DbnError> {
        training::fine_tune(self, samples, labels, epochs, config).map(|r| r.final_loss)
    }

    /// Classification error rate in `[0, 1]`. See [`training::evaluate`].
    pub fn evaluate(&self, samples: &[Vec<f32>], labels: &[Vec<f32>]) -> Result<f32, DbnError> {
        training::evaluate(self, samples, labels)
    }

    /// Predicted class index for every sample.
    pub fn predict(&self, samples: &[Vec<f32>]) -> Result<Vec<usize>, DbnError> {
        training::predict(self, samples)
    }

    /// Converts the network to its export layout.
    pub fn to_export(&self) -> Result<DbnExport, DbnError> {
        let layers = self
            .layers
            .iter()
            .map(|layer| {
                Ok(LayerExport {
                    visible_size: layer.visible_size(),
                    hidden_size: layer.hidden_size(),
                    visible_unit: layer.visible_unit(),
                    hidden_unit: layer.hidden_unit(),
                    weights: tensor_to_rows(layer.weights().clone())?,
                    hidden_bias: tensor_to_vec(layer.hidden_bias().clone())?,
                    visible_bias: tensor_to_vec(layer.visible_bias().clone())?,
                })
            })
            .collect::<Result<Vec<_>, DbnError>>()?;
        Ok(DbnExport {
            format_version: FORMAT_VERSION,
            layers,
        })
    }

    /// Rebuilds a network from its export layout.
    pub fn from_export(export: &DbnExport, device: &B::Device) -> Result<Self, DbnError> {
        if export.format_version != FORMAT_VERSION {
            return Err(DbnError::UnsupportedFormatVersion {
                found: export.format_version,
                supported: FORMAT_VERSION,
            });
        }
        let layers = export
            .layers
            .iter()
            .map(|layer| layer.to_rbm(device))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_layers(layers)
    }

    /// Serializes the network to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, DbnError> {
        Ok(serde_json::to_string_pretty(&self.to_export()?)?)
    }

    /// Parses a network from JSON.
    pub fn from_json(json: &str, device: &B::Device) -> Result<Self, DbnError> {
        let export: DbnExport = serde_json::from_str(json)?;
        Self::from_export(&export, device)
    }

    /// Writes the network to `path` as JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), DbnError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reads a network written by [`Dbn::save_json`].
    pub fn load_json(path: impl AsRef<Path>, device: &B::Device) -> Result<Self, DbnError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json, device)
    }
}

/// Export format for a whole network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbnExport {
    pub format_version: u32,
    pub layers: Vec<LayerExport>,
}

/// Export format for one layer. `weights` is row-major `[visible_size][hidden_size]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerExport {
    pub visible_size: usize,
    pub hidden_size: usize,
    pub visible_unit: UnitType,
    pub hidden_unit: UnitType,
    pub weights: Vec<Vec<f32>>,
    pub hidden_bias: Vec<f32>,
    pub visible_bias: Vec<f32>,
}

impl LayerExport {
    fn to_rbm<B: Backend>(&self, device: &B::Device) -> Result<Rbm<B>, DbnError> {
        if self.weights.len() != self.visible_size {
            return Err(DbnError::DimensionMismatch {
                context: "exported weight rows",
                expected: self.visible_size,
                actual: self.weights.len(),
            });
        }
        crate::data::check_rows(&self.weights, self.hidden_size, "exported weight columns")?;
        let weights = rows_to_tensor::<B>(
            self.weights.iter().map(Vec::as_slice),
            self.hidden_size,
            device,
        );
        let hidden_bias = Tensor::<B, 1>::from_floats(self.hidden_bias.as_slice(), device);
        let visible_bias = Tensor::<B, 1>::from_floats(self.visible_bias.as_slice(), device);
        Rbm::from_parts(
            self.visible_unit,
            self.hidden_unit,
            weights,
            hidden_bias,
            visible_bias,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> DbnConfig {
        DbnConfig::with_input_size(6)
            .rbm(4, UnitType::Binary)
            .rbm(3, UnitType::Softmax)
    }

    #[test]
    fn test_dbn_config_creation() {
        let config = small_config();

        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.layers[1].visible_size, 4);
        assert_eq!(config.layers[1].hidden_unit, UnitType::Softmax);
    }

    #[test]
    fn test_dbn_build() {
        let device = <TestBackend as Backend>::Device::default();
        let dbn: Dbn<TestBackend> = small_config().build(&device, 1).expect("valid topology");

        assert_eq!(dbn.input_size(), 6);
        assert_eq!(dbn.output_size(), 3);
        assert_eq!(dbn.num_layers(), 2);
        assert_eq!(dbn.output_unit(), UnitType::Softmax);
    }

    #[test]
    fn test_dbn_mismatched_dims_is_topology_error() {
        let device = <TestBackend as Backend>::Device::default();
        let result: Result<Dbn<TestBackend>, _> = DbnConfig::new()
            .layer(RbmConfig::new(784, 100))
            .layer(RbmConfig::new(200, 10))
            .build(&device, 1);

        assert!(matches!(result, Err(DbnError::Topology { .. })));
    }

    #[test]
    fn test_dbn_topology_rules() {
        let invalid = [
            DbnConfig::new(),
            DbnConfig::new().rbm(4, UnitType::Binary),
            DbnConfig::with_input_size(4)
                .rbm(3, UnitType::Softmax)
                .rbm(2, UnitType::Binary),
            DbnConfig::new().layer(RbmConfig::new(4, 2).with_visible_unit(UnitType::Relu)),
        ];
        for config in invalid {
            assert!(
                matches!(config.validate(), Err(DbnError::Topology { .. })),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_dbn_forward_shapes_and_determinism() {
        let device = <TestBackend as Backend>::Device::default();
        let dbn: Dbn<TestBackend> = small_config().build(&device, 5).unwrap();
        let input = Tensor::<TestBackend, 2>::ones([2, 6], &device);

        let first: Vec<f32> = dbn.forward(input.clone()).to_data().to_vec().unwrap();
        let second: Vec<f32> = dbn.forward(input.clone()).to_data().to_vec().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);

        assert_eq!(dbn.forward_all(0, input.clone()).dims(), [2, 4]);
        assert_eq!(dbn.forward_all(1, input).dims(), [2, 3]);
    }

    #[test]
    fn test_forward_sample() {
        let device = <TestBackend as Backend>::Device::default();
        let dbn: Dbn<TestBackend> = small_config().build(&device, 5).unwrap();

        let output = dbn.forward_sample(&[1.0, 0.0, 1.0, 0.0, 1.0, 0.0]).unwrap();
        assert_eq!(output.len(), 3);
        assert!((output.iter().sum::<f32>() - 1.0).abs() < 1e-5);

        assert!(matches!(
            dbn.forward_sample(&[1.0, 0.0]),
            Err(DbnError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_json_round_trip_preserves_outputs() {
        let device = <TestBackend as Backend>::Device::default();
        let dbn: Dbn<TestBackend> = small_config().build(&device, 9).unwrap();
        let json = dbn.to_json().unwrap();
        let restored: Dbn<TestBackend> = Dbn::from_json(&json, &device).unwrap();

        let sample = [0.0, 1.0, 1.0, 0.0, 0.0, 1.0];
        assert_eq!(
            dbn.forward_sample(&sample).unwrap(),
            restored.forward_sample(&sample).unwrap()
        );
        assert_eq!(restored.output_unit(), UnitType::Softmax);
    }

    #[test]
    fn test_unknown_format_version_is_rejected() {
        let device = <TestBackend as Backend>::Device::default();
        let dbn: Dbn<TestBackend> = small_config().build(&device, 9).unwrap();
        let mut export = dbn.to_export().unwrap();
        export.format_version = 99;

        let result = Dbn::<TestBackend>::from_export(&export, &device);
        assert!(matches!(
            result,
            Err(DbnError::UnsupportedFormatVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_config_from_json_descriptor() {
        let json = r#"{
            "layers": [
                { "visible_size": 8, "hidden_size": 4, "visible_unit": "GAUSSIAN" },
                { "visible_size": 4, "hidden_size": 2, "hidden_unit": "SOFTMAX" }
            ]
        }"#;
        let config = DbnConfig::from_json(json).unwrap();

        assert_eq!(config.layers[0].visible_unit, UnitType::Gaussian);
        assert_eq!(config.layers[0].hidden_unit, UnitType::Binary);
        assert!((config.layers[0].init_std - 0.01).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }
}
