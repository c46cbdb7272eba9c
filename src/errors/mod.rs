//! Error types for network construction, training and persistence.

mod dbn_error;

pub use dbn_error::DbnError;
