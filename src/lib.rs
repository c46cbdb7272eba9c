//! # deepbelief
//!
//! Deep belief networks built from stacked restricted Boltzmann machines,
//! trained in two phases:
//!
//! - **Pretraining**: greedy, unsupervised, layer by layer with contrastive
//!   divergence. Each layer learns from the activations of the layers below.
//! - **Fine-tuning**: supervised mini-batch gradient descent through the whole
//!   stack, with the top layer acting as the classifier.
//!
//! Both phases take an explicit [`OptimizerPolicy`] (learning rate, momentum,
//! weight decay, batch size). Tensors are [`burn`] tensors, so any burn
//! backend works; [`Backend`] is the CPU default.
//!
//! ## Example
//!
//! ```
//! use deepbelief::prelude::*;
//!
//! let device = <Backend as burn::tensor::backend::Backend>::Device::default();
//!
//! let mut dbn: Dbn<Backend> = DbnConfig::with_input_size(4)
//!     .rbm(3, UnitType::Binary)
//!     .rbm(2, UnitType::Softmax)
//!     .build(&device, 42)
//!     .expect("valid topology");
//!
//! let samples = vec![vec![1.0, 1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0, 1.0]];
//! let labels = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
//! let config = TrainingConfig::new(OptimizerPolicy::new(0.1, 2).momentum(0.5));
//!
//! dbn.pretrain(&samples, 5, &config).unwrap();
//! let loss = dbn.fine_tune(&samples, &labels, 10, &config).unwrap();
//! assert!(loss.is_finite());
//!
//! let error_rate = dbn.evaluate(&samples, &labels).unwrap();
//! assert!((0.0..=1.0).contains(&error_rate));
//! ```

pub mod data;
pub mod dbn;
pub mod errors;
pub mod layers;
pub mod training;

// Re-exports for convenience
pub use dbn::{Dbn, DbnConfig};
pub use errors::DbnError;
pub use layers::{Rbm, RbmConfig, UnitType};
pub use training::{OptimizerPolicy, TrainingConfig, WeightDecay};

/// Default CPU backend.
pub type Backend = burn::backend::NdArray;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::Backend;
    pub use crate::data::Dataset;
    pub use crate::dbn::{Dbn, DbnConfig};
    pub use crate::errors::DbnError;
    pub use crate::layers::{RbmConfig, UnitType};
    pub use crate::training::{
        DataPlacement, OptimizerPolicy, StopSignal, TrainingConfig, WeightDecay,
    };
}
