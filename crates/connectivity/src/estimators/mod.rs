//! Connectivity estimators
//!
//! Every estimator consumes the same per-epoch, per-pair cross-spectral terms and keeps
//! its own running sums in an [`AccumulatorState`]. Accumulators built on different
//! partitions of the epochs are merged with [`AccumulatorState::combine`], an elementwise
//! sum, before [`ConnectivityEstimator::finalize`] reduces them to one value per pair and
//! frequency.

pub mod coherency;
pub mod pli;
pub mod wpli;

pub use coherency::*;
pub use pli::*;
pub use wpli::*;

use ndarray::Array2;
use num_complex::Complex64;
use std::sync::Arc;

use crate::error::{ConnectivityError, ConnectivityResult};
use crate::registry::EstimatorRegistry;

/// Cross-spectral terms of one signal pair for one epoch, over the kept frequencies.
#[derive(Debug, Clone, Copy)]
pub struct PairSpectra<'a> {
    /// Weighted cross-spectrum `Cxy`.
    pub csd: &'a [Complex64],
    /// Weighted power of the seed signal `Pxx`.
    pub psd_x: &'a [f64],
    /// Weighted power of the target signal `Pyy`.
    pub psd_y: &'a [f64],
}

/// Finalized connectivity, shaped (n_pairs, n_freqs).
#[derive(Debug, Clone, PartialEq)]
pub enum ConValues {
    Real(Array2<f64>),
    Complex(Array2<Complex64>),
}

impl ConValues {
    pub fn dim(&self) -> (usize, usize) {
        match self {
            ConValues::Real(v) => v.dim(),
            ConValues::Complex(v) => v.dim(),
        }
    }

    pub fn as_real(&self) -> Option<&Array2<f64>> {
        match self {
            ConValues::Real(v) => Some(v),
            ConValues::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&Array2<Complex64>> {
        match self {
            ConValues::Complex(v) => Some(v),
            ConValues::Real(_) => None,
        }
    }
}

/// Running sums owned by one estimator instance.
///
/// `real` and `complex` hold method-specific (n_pairs, n_freqs) sums; `n_epochs` counts the
/// epochs folded in. Two states combine only if their layouts agree.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatorState {
    pub real: Vec<Array2<f64>>,
    pub complex: Vec<Array2<Complex64>>,
    pub n_epochs: usize,
}

impl AccumulatorState {
    pub fn new(n_real: usize, n_complex: usize, n_cons: usize, n_freqs: usize) -> Self {
        Self {
            real: (0..n_real).map(|_| Array2::zeros((n_cons, n_freqs))).collect(),
            complex: (0..n_complex)
                .map(|_| Array2::zeros((n_cons, n_freqs)))
                .collect(),
            n_epochs: 0,
        }
    }

    pub fn mark_epoch(&mut self) {
        self.n_epochs += 1;
    }

    fn layout(&self) -> (usize, usize, Option<(usize, usize)>) {
        let dim = self
            .real
            .first()
            .map(|a| a.dim())
            .or_else(|| self.complex.first().map(|a| a.dim()));
        (self.real.len(), self.complex.len(), dim)
    }

    /// Adds `other`'s sums and epoch count into `self`.
    pub fn combine(&mut self, other: &AccumulatorState) -> ConnectivityResult<()> {
        if self.layout() != other.layout() {
            return Err(ConnectivityError::IncompatibleAccumulators(format!(
                "layout {:?} vs {:?}",
                self.layout(),
                other.layout()
            )));
        }
        for (mine, theirs) in self.real.iter_mut().zip(&other.real) {
            *mine += theirs;
        }
        for (mine, theirs) in self.complex.iter_mut().zip(&other.complex) {
            *mine += theirs;
        }
        self.n_epochs += other.n_epochs;
        Ok(())
    }
}

/// A stateful connectivity accumulator.
///
/// `accumulate` is called once per epoch for every pair; the driver then calls
/// `state_mut().mark_epoch()`. `finalize` may be called once all epochs, and all partial
/// accumulators, have been folded in.
pub trait ConnectivityEstimator: Send {
    /// Registry name of the method this accumulator implements.
    fn name(&self) -> &str;

    fn accumulate(&mut self, con_idx: usize, spectra: &PairSpectra<'_>);

    fn state(&self) -> &AccumulatorState;

    fn state_mut(&mut self) -> &mut AccumulatorState;

    /// Merges an accumulator of the same method built on a different set of epochs.
    fn combine(&mut self, other: &dyn ConnectivityEstimator) -> ConnectivityResult<()> {
        if self.name() != other.name() {
            return Err(ConnectivityError::IncompatibleAccumulators(format!(
                "cannot merge '{}' into '{}'",
                other.name(),
                self.name()
            )));
        }
        self.state_mut().combine(other.state())
    }

    fn finalize(&self) -> ConValues;
}

/// Builds empty accumulators for one method.
///
/// Implement this (together with [`ConnectivityEstimator`]) to plug a custom measure into
/// the pipeline without touching it.
pub trait EstimatorFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(&self, n_cons: usize, n_freqs: usize) -> Box<dyn ConnectivityEstimator>;
}

/// Sign of `x`, with sign(0) = 0.
pub(crate) fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Register all built-in estimators with the registry
pub fn register_builtin_estimators(registry: &mut EstimatorRegistry) {
    registry.register(Arc::new(CoherencyFactory::new(CoherencyKind::Coh)));
    registry.register(Arc::new(CoherencyFactory::new(CoherencyKind::Cohy)));
    registry.register(Arc::new(CoherencyFactory::new(CoherencyKind::ImCoh)));
    registry.register(Arc::new(PliFactory::new(false)));
    registry.register(Arc::new(PliFactory::new(true)));
    registry.register(Arc::new(WpliFactory::new(false)));
    registry.register(Arc::new(WpliFactory::new(true)));
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Feeds the same cross-spectra for `n_epochs` epochs into a fresh estimator.
    pub fn run(
        factory: &dyn EstimatorFactory,
        epochs: &[Vec<Complex64>],
        psd_x: &[f64],
        psd_y: &[f64],
    ) -> Box<dyn ConnectivityEstimator> {
        let mut est = factory.create(1, psd_x.len());
        for csd in epochs {
            est.accumulate(
                0,
                &PairSpectra {
                    csd,
                    psd_x,
                    psd_y,
                },
            );
            est.state_mut().mark_epoch();
        }
        est
    }
}
