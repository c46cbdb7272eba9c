//! Errors surfaced by the network and its training engines.

use thiserror::Error;

/// Errors that can occur while building, training, evaluating or persisting a network.
#[derive(Debug, Error)]
pub enum DbnError {
    /// Structural misconfiguration detected when the stack is built.
    #[error("Invalid topology: {message}")]
    Topology { message: String },

    /// An input, label or batch does not have the shape the network expects.
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An update produced NaN or infinite values. The offending step was not applied.
    #[error("Numeric instability during {stage} (layer {layer}, epoch {epoch})")]
    NumericInstability {
        stage: &'static str,
        layer: usize,
        epoch: usize,
    },

    #[error("Invalid optimizer policy: {message}")]
    InvalidPolicy { message: String },

    #[error("Dataset is empty")]
    EmptyDataset,

    /// Training was stopped through a [`crate::training::StopSignal`].
    #[error("{stage} cancelled at layer {layer}, epoch {epoch}")]
    Cancelled {
        stage: &'static str,
        layer: usize,
        epoch: usize,
    },

    #[error("Tensor error: {message}")]
    Tensor { message: String },

    #[error("Unsupported format version {found} (supported: {supported})")]
    UnsupportedFormatVersion { found: u32, supported: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbnError {
    pub(crate) fn topology(message: impl Into<String>) -> Self {
        DbnError::Topology {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_policy(message: impl Into<String>) -> Self {
        DbnError::InvalidPolicy {
            message: message.into(),
        }
    }

    /// Fills in where a layer-local numeric failure happened.
    pub(crate) fn at(self, layer: usize, epoch: usize) -> Self {
        match self {
            DbnError::NumericInstability { stage, .. } => DbnError::NumericInstability {
                stage,
                layer,
                epoch,
            },
            other => other,
        }
    }

    pub(crate) fn at_epoch(self, epoch: usize) -> Self {
        match self {
            DbnError::NumericInstability { stage, layer, .. } => DbnError::NumericInstability {
                stage,
                layer,
                epoch,
            },
            other => other,
        }
    }
}
