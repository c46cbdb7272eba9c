//! Network layer implementations.
//!
//! This module contains the restricted Boltzmann machine layer and the unit
//! types its visible and hidden sides can use.

pub mod rbm;
pub mod unit;

pub use rbm::{Rbm, RbmConfig};
pub use unit::UnitType;
