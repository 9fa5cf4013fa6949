//! Epoch pipeline and parallel driver.
//!
//! One pass per epoch: spectra for the used signals, then every pair's cross-spectrum fed
//! to every requested estimator. With more than one job the epochs are split into
//! contiguous partitions, each worker owns private accumulators, and the partial
//! accumulators are merged once all workers have finished.

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;
use spectral::SpectralEstimator;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::thread;
use tracing::debug;

use crate::config::Indices;
use crate::error::{ConnectivityError, ConnectivityResult};
use crate::estimators::{ConnectivityEstimator, EstimatorFactory, PairSpectra};

type Estimators = Vec<Box<dyn ConnectivityEstimator>>;

/// Per-epoch work shared read-only by every worker.
pub(crate) struct EpochPipeline<'a> {
    spectral: &'a SpectralEstimator,
    /// Signals to transform, ascending.
    signals: Vec<usize>,
    /// Pairs as positions into `signals`.
    pairs: Vec<(usize, usize)>,
    freq_idx: &'a [usize],
    factories: &'a [Arc<dyn EstimatorFactory>],
}

impl<'a> EpochPipeline<'a> {
    pub(crate) fn new(
        spectral: &'a SpectralEstimator,
        indices: &Indices,
        freq_idx: &'a [usize],
        factories: &'a [Arc<dyn EstimatorFactory>],
    ) -> ConnectivityResult<Self> {
        let signals = indices.used_signals();
        let pairs = pair_positions(&signals, indices.pairs())?;
        Ok(Self {
            spectral,
            signals,
            pairs,
            freq_idx,
            factories,
        })
    }

    fn create_estimators(&self) -> Estimators {
        self.factories
            .iter()
            .map(|factory| factory.create(self.pairs.len(), self.freq_idx.len()))
            .collect()
    }

    fn accumulate_epoch(
        &self,
        epoch: ArrayView2<'_, f64>,
        estimators: &mut [Box<dyn ConnectivityEstimator>],
    ) -> ConnectivityResult<()> {
        let spectra = self.spectral.compute(epoch, &self.signals, self.freq_idx)?;
        let psds: Vec<Vec<f64>> = (0..self.signals.len())
            .map(|sig| spectra.psd(sig).to_vec())
            .collect();

        let mut csd = vec![Complex64::new(0.0, 0.0); self.freq_idx.len()];
        for (con, &(x, y)) in self.pairs.iter().enumerate() {
            spectra.cross_spectrum_into(x, y, &mut csd);
            let pair = PairSpectra {
                csd: &csd,
                psd_x: &psds[x],
                psd_y: &psds[y],
            };
            for estimator in estimators.iter_mut() {
                estimator.accumulate(con, &pair);
            }
        }

        for estimator in estimators.iter_mut() {
            estimator.state_mut().mark_epoch();
        }
        Ok(())
    }

    /// Streams epochs through one set of accumulators, stopping at the first error.
    pub(crate) fn run_sequential<I>(&self, epochs: I) -> ConnectivityResult<Estimators>
    where
        I: IntoIterator<Item = ConnectivityResult<Array2<f64>>>,
    {
        let mut estimators = self.create_estimators();
        for epoch in epochs {
            self.accumulate_epoch(epoch?.view(), &mut estimators)?;
        }
        Ok(estimators)
    }

    fn run_partition(&self, epochs: &[Array2<f64>]) -> ConnectivityResult<Estimators> {
        let mut estimators = self.create_estimators();
        for epoch in epochs {
            self.accumulate_epoch(epoch.view(), &mut estimators)?;
        }
        Ok(estimators)
    }

    /// Splits `epochs` into at most `n_jobs` contiguous partitions, runs each on its own
    /// thread and merges the partial accumulators.
    pub(crate) fn run_parallel(
        &self,
        epochs: &[Array2<f64>],
        n_jobs: usize,
    ) -> ConnectivityResult<Estimators> {
        let partitions = partition(epochs.len(), n_jobs);
        if partitions.len() <= 1 {
            return self.run_partition(epochs);
        }
        debug!(
            "Running {} epochs on {} workers",
            epochs.len(),
            partitions.len()
        );

        let partials = thread::scope(|scope| -> ConnectivityResult<Vec<Estimators>> {
            let mut handles = Vec::with_capacity(partitions.len());
            for (worker, range) in partitions.into_iter().enumerate() {
                let chunk = &epochs[range];
                let handle = thread::Builder::new()
                    .name(format!("connectivity-worker-{worker}"))
                    .spawn_scoped(scope, move || {
                        debug!("Worker {} started on {} epochs", worker, chunk.len());
                        self.run_partition(chunk)
                    })?;
                handles.push((worker, handle));
            }

            handles
                .into_iter()
                .map(|(worker, handle)| {
                    handle
                        .join()
                        .map_err(|_| ConnectivityError::WorkerPanicked { worker })?
                })
                .collect()
        })?;

        merge(partials)
    }
}

/// Contiguous, near-equal ranges covering `0..n`; the first `n % parts` ranges are one
/// longer. `parts` is clamped to `1..=n`.
/// Maps `(seed, target)` signal indices onto their positions in `signals`.
fn pair_positions(
    signals: &[usize],
    pairs: impl Iterator<Item = (usize, usize)>,
) -> ConnectivityResult<Vec<(usize, usize)>> {
    let positions: BTreeMap<usize, usize> = signals
        .iter()
        .enumerate()
        .map(|(position, &sig)| (sig, position))
        .collect();
    let lookup = |sig: usize| {
        positions.get(&sig).copied().ok_or_else(|| {
            ConnectivityError::invalid(format!("signal {sig} is not among the transformed signals"))
        })
    };
    pairs
        .map(|(seed, target)| -> ConnectivityResult<(usize, usize)> {
            Ok((lookup(seed)?, lookup(target)?))
        })
        .collect()
}

pub(crate) fn partition(n: usize, parts: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, n);
    let base = n / parts;
    let extra = n % parts;
    let mut start = 0;
    (0..parts)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Folds partial accumulators into the first, method by method.
fn merge(partials: Vec<Estimators>) -> ConnectivityResult<Estimators> {
    let mut partials = partials.into_iter();
    let mut merged = partials.next().ok_or(ConnectivityError::NoEpochs)?;
    for partial in partials {
        for (into, from) in merged.iter_mut().zip(&partial) {
            into.combine(from.as_ref())?;
        }
    }
    Ok(merged)
}
