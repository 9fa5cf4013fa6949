//! Orchestrator: validates a request, runs the epoch pipeline and packages the result.

use eeg_types::{EpochLike, SpectralMode};
use ndarray::{s, Array2, Array3, ArrayD};
use num_complex::Complex64;
use serde::Serialize;
use spectral::{SpectralConfig, SpectralEstimator};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::binning::{Frequencies, FrequencyBinner};
use crate::config::{Band, ConnectivityParams, Indices};
use crate::driver::EpochPipeline;
use crate::epochs::EpochSource;
use crate::error::{ConnectivityError, ConnectivityResult};
use crate::estimators::{ConValues, EstimatorFactory};
use crate::registry::{EstimatorRegistry, Method};

/// Cycles an epoch must span at the lowest frequency used.
const MIN_CYCLES: f64 = 5.0;

/// Connectivity values of one method.
///
/// Shaped (n_signals, n_signals, n_out) when every lower-triangle pair was requested, with
/// only the `[seed, target, ..]` entries below the diagonal filled, or (n_pairs, n_out) for
/// explicit indices.
#[derive(Debug, Clone, PartialEq)]
pub enum ConArray {
    Real(ArrayD<f64>),
    Complex(ArrayD<Complex64>),
}

impl ConArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            ConArray::Real(a) => a.shape(),
            ConArray::Complex(a) => a.shape(),
        }
    }

    pub fn as_real(&self) -> Option<&ArrayD<f64>> {
        match self {
            ConArray::Real(a) => Some(a),
            ConArray::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ArrayD<Complex64>> {
        match self {
            ConArray::Complex(a) => Some(a),
            ConArray::Real(_) => None,
        }
    }
}

/// What produced one connectivity array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimatorMetadata {
    pub method: String,
    pub spectral_mode: SpectralMode,
    pub n_tapers: usize,
    pub adaptive: bool,
    pub n_epochs: usize,
}

/// Result of a connectivity run. `connectivity` and `metadata` follow the order of the
/// requested methods.
#[derive(Debug, Clone)]
pub struct ConnectivityOutput {
    pub connectivity: Vec<ConArray>,
    pub freqs: Frequencies,
    pub n_epochs: usize,
    pub metadata: Vec<EstimatorMetadata>,
}

/// Computes spectral connectivity over `epochs` for every method in `methods`, resolving
/// method names against the built-in registry.
///
/// `epochs` is anything that yields [`EpochLike`] items: the outer iterator of a 3-D array,
/// a slice of [`eeg_types::Epoch`], or a lazy generator.
pub fn spectral_connectivity<T, E>(
    epochs: T,
    methods: &[Method],
    params: &ConnectivityParams,
) -> ConnectivityResult<ConnectivityOutput>
where
    T: IntoIterator<Item = E>,
    E: EpochLike,
{
    spectral_connectivity_with_registry(epochs, methods, params, &EstimatorRegistry::builtin())
}

/// Same as [`spectral_connectivity`], with names resolved against `registry`.
pub fn spectral_connectivity_with_registry<T, E>(
    epochs: T,
    methods: &[Method],
    params: &ConnectivityParams,
    registry: &EstimatorRegistry,
) -> ConnectivityResult<ConnectivityOutput>
where
    T: IntoIterator<Item = E>,
    E: EpochLike,
{
    let bands = params.validate()?;
    if methods.is_empty() {
        return Err(ConnectivityError::invalid("at least one method is required"));
    }
    let factories = methods
        .iter()
        .map(|method| registry.resolve(method))
        .collect::<ConnectivityResult<Vec<Arc<dyn EstimatorFactory>>>>()?;

    let mut source = EpochSource::new(epochs, params.sfreq, params.tmin, params.tmax);
    let first = source.next().ok_or(ConnectivityError::NoEpochs)??;
    let (n_signals, n_times) = first.dim();

    let (indices, dense) = match &params.indices {
        Some(indices) => (indices.clone(), false),
        None => {
            if n_signals < 2 {
                return Err(ConnectivityError::invalid(format!(
                    "at least two signals are needed for connectivity, got {n_signals}"
                )));
            }
            (Indices::lower_triangle(n_signals), true)
        }
    };
    indices.check_range(n_signals)?;

    let bands = raise_to_min_frequency(bands, params.sfreq, n_times);

    let mut config = SpectralConfig::new(params.spectral_mode, params.sfreq, n_times);
    config.mt_bandwidth = params.mt_bandwidth;
    config.mt_adaptive = params.mt_adaptive;
    config.mt_low_bias = params.mt_low_bias;
    let spectral = SpectralEstimator::new(config)?;
    let binner = FrequencyBinner::new(spectral.freqs(), &bands, params.fskip, params.faverage)?;

    info!(
        "Connectivity: {} method(s), {} pairs, {} frequencies, mode {}, {} taper(s), {} job(s)",
        factories.len(),
        indices.len(),
        binner.freqs().len(),
        params.spectral_mode,
        spectral.n_tapers(),
        params.n_jobs
    );

    let pipeline = EpochPipeline::new(&spectral, &indices, binner.kept_indices(), &factories)?;
    let estimators = if params.n_jobs > 1 {
        let mut epochs = vec![first];
        for epoch in source {
            epochs.push(epoch?);
        }
        pipeline.run_parallel(&epochs, params.n_jobs)?
    } else {
        pipeline.run_sequential(std::iter::once(Ok(first)).chain(source))?
    };

    let n_epochs = estimators
        .first()
        .map(|estimator| estimator.state().n_epochs)
        .unwrap_or_default();
    debug!("Accumulated {} epochs", n_epochs);

    let mut connectivity = Vec::with_capacity(estimators.len());
    let mut metadata = Vec::with_capacity(estimators.len());
    for estimator in &estimators {
        let values = binner.reduce(estimator.finalize());
        connectivity.push(if dense {
            to_dense(values, &indices, n_signals)
        } else {
            to_pairs(values)
        });
        metadata.push(EstimatorMetadata {
            method: estimator.name().to_string(),
            spectral_mode: params.spectral_mode,
            n_tapers: spectral.n_tapers(),
            adaptive: spectral.is_adaptive(),
            n_epochs: estimator.state().n_epochs,
        });
    }

    info!("Connectivity computed from {} epochs", n_epochs);
    Ok(ConnectivityOutput {
        connectivity,
        freqs: binner.output_frequencies(),
        n_epochs,
        metadata,
    })
}

/// Raises every band's lower edge to the lowest frequency with `MIN_CYCLES` cycles in an
/// epoch of `n_times` samples.
fn raise_to_min_frequency(bands: Vec<Band>, sfreq: f64, n_times: usize) -> Vec<Band> {
    let min_freq = MIN_CYCLES * sfreq / n_times as f64;
    bands
        .into_iter()
        .map(|band| {
            if band.fmin >= min_freq {
                return band;
            }
            if band.fmin.is_finite() {
                warn!(
                    "fmin = {:.3} Hz gives fewer than {} cycles in a {:.3} s epoch; using fmin = {:.3} Hz",
                    band.fmin,
                    MIN_CYCLES,
                    n_times as f64 / sfreq,
                    min_freq
                );
            }
            Band::new(min_freq, band.fmax)
        })
        .collect()
}

fn to_pairs(values: ConValues) -> ConArray {
    match values {
        ConValues::Real(v) => ConArray::Real(v.into_dyn()),
        ConValues::Complex(v) => ConArray::Complex(v.into_dyn()),
    }
}

fn to_dense(values: ConValues, indices: &Indices, n_signals: usize) -> ConArray {
    fn scatter<A: Clone + Default>(
        values: Array2<A>,
        indices: &Indices,
        n_signals: usize,
    ) -> ArrayD<A> {
        let n_out = values.ncols();
        let mut dense = Array3::<A>::default((n_signals, n_signals, n_out));
        for (con, (seed, target)) in indices.pairs().enumerate() {
            dense
                .slice_mut(s![seed, target, ..])
                .assign(&values.row(con));
        }
        dense.into_dyn()
    }

    match values {
        ConValues::Real(v) => ConArray::Real(scatter(v, indices, n_signals)),
        ConValues::Complex(v) => ConArray::Complex(scatter(v, indices, n_signals)),
    }
}
