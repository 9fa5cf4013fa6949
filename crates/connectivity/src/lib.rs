//! Spectral connectivity between signal pairs across epochs
//!
//! Epochs flow through a single pipeline: the epoch source validates and crops them, the
//! spectral estimator turns each one into tapered Fourier coefficients, and every requested
//! connectivity method accumulates the shared per-pair cross-spectra. Accumulators from
//! parallel partitions are merged before the frequency binner selects, decimates and
//! optionally averages the frequency axis.

pub mod api;
pub mod binning;
pub mod config;
mod driver;
pub mod epochs;
pub mod error;
pub mod estimators;
pub mod registry;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use api::*;
pub use binning::*;
pub use config::*;
pub use epochs::*;
pub use error::*;
pub use estimators::*;
pub use registry::*;
