//! Per-epoch spectral decomposition for connectivity estimation.
//!
//! An epoch of shape (signals x samples) is turned into complex coefficients indexed by
//! (signal, taper, frequency) on the non-negative half of the DFT grid, together with the
//! per-taper weights that should be used when forming power and cross spectra.

pub mod adaptive;
pub mod dpss;
pub mod error;
pub mod estimator;
pub mod window;

pub use adaptive::{adaptive_weights, AdaptiveWeights, ADAPTIVE_MAX_ITER};
pub use dpss::{dpss_windows, Dpss};
pub use error::*;
pub use estimator::*;
pub use window::{frequency_grid, hann};
