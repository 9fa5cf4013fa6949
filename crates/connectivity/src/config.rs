//! Connectivity run configuration and parameter validation

use eeg_types::SpectralMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{ConnectivityError, ConnectivityResult};

/// A frequency bound: one value, or one value per band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FreqBound {
    Single(f64),
    Bands(Vec<f64>),
}

impl FreqBound {
    fn values(&self) -> Vec<f64> {
        match self {
            FreqBound::Single(v) => vec![*v],
            FreqBound::Bands(v) => v.clone(),
        }
    }
}

impl From<f64> for FreqBound {
    fn from(value: f64) -> Self {
        FreqBound::Single(value)
    }
}

impl From<Vec<f64>> for FreqBound {
    fn from(values: Vec<f64>) -> Self {
        FreqBound::Bands(values)
    }
}

/// One inclusive frequency band in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub fmin: f64,
    pub fmax: f64,
}

impl Band {
    pub fn new(fmin: f64, fmax: f64) -> Self {
        Self { fmin, fmax }
    }

    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.fmin && freq <= self.fmax
    }
}

/// Which signal pairs to evaluate: `seeds[i]` against `targets[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indices {
    pub seeds: Vec<usize>,
    pub targets: Vec<usize>,
}

impl Indices {
    pub fn new(seeds: Vec<usize>, targets: Vec<usize>) -> ConnectivityResult<Self> {
        let indices = Self { seeds, targets };
        indices.validate()?;
        Ok(indices)
    }

    /// All pairs strictly below the diagonal of an `n_signals` square matrix, row by row:
    /// (1, 0), (2, 0), (2, 1), (3, 0), ...
    pub fn lower_triangle(n_signals: usize) -> Self {
        let (seeds, targets) = (0..n_signals)
            .flat_map(|row| (0..row).map(move |col| (row, col)))
            .unzip();
        Self { seeds, targets }
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.seeds.iter().copied().zip(self.targets.iter().copied())
    }

    /// Every signal that takes part in at least one pair, ascending.
    pub fn used_signals(&self) -> Vec<usize> {
        self.seeds
            .iter()
            .chain(self.targets.iter())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn validate(&self) -> ConnectivityResult<()> {
        if self.seeds.len() != self.targets.len() {
            return Err(ConnectivityError::invalid(format!(
                "indices must have the same length, got {} seeds and {} targets",
                self.seeds.len(),
                self.targets.len()
            )));
        }
        if self.seeds.is_empty() {
            return Err(ConnectivityError::invalid("indices must contain at least one pair"));
        }
        Ok(())
    }

    pub(crate) fn check_range(&self, n_signals: usize) -> ConnectivityResult<()> {
        match self.seeds.iter().chain(self.targets.iter()).find(|&&i| i >= n_signals) {
            Some(bad) => Err(ConnectivityError::invalid(format!(
                "signal index {bad} is out of range for epochs with {n_signals} signals"
            ))),
            None => Ok(()),
        }
    }
}

/// Parameters of a connectivity run.
///
/// Every field has a default, so a JSON document only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityParams {
    pub spectral_mode: SpectralMode,
    /// Sampling rate in Hz.
    pub sfreq: f64,
    /// Pairs to evaluate; `None` means every pair below the diagonal.
    pub indices: Option<Indices>,
    pub fmin: Option<FreqBound>,
    pub fmax: Option<FreqBound>,
    /// Keep every (fskip + 1)-th frequency bin.
    pub fskip: usize,
    /// Average each band into a single value.
    pub faverage: bool,
    pub tmin: Option<f64>,
    pub tmax: Option<f64>,
    /// Multitaper bandwidth in Hz.
    pub mt_bandwidth: Option<f64>,
    pub mt_adaptive: bool,
    pub mt_low_bias: bool,
    pub n_jobs: usize,
}

impl Default for ConnectivityParams {
    fn default() -> Self {
        Self {
            spectral_mode: SpectralMode::Multitaper,
            sfreq: 2.0 * std::f64::consts::PI,
            indices: None,
            fmin: None,
            fmax: None,
            fskip: 0,
            faverage: false,
            tmin: None,
            tmax: None,
            mt_bandwidth: None,
            mt_adaptive: false,
            mt_low_bias: true,
            n_jobs: 1,
        }
    }
}

impl ConnectivityParams {
    pub fn new(sfreq: f64) -> Self {
        Self {
            sfreq,
            ..Self::default()
        }
    }

    /// Parses parameters from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ConnectivityResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_mode(mut self, mode: SpectralMode) -> Self {
        self.spectral_mode = mode;
        self
    }

    pub fn with_indices(mut self, indices: Indices) -> Self {
        self.indices = Some(indices);
        self
    }

    pub fn with_bands(mut self, fmin: impl Into<FreqBound>, fmax: impl Into<FreqBound>) -> Self {
        self.fmin = Some(fmin.into());
        self.fmax = Some(fmax.into());
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.mt_adaptive = adaptive;
        self
    }

    /// Resolves `fmin`/`fmax` into bands.
    ///
    /// A missing bound is -inf (fmin) or +inf (fmax) and broadcasts to the length of the
    /// other bound. A scalar counts as a one-element sequence.
    pub fn bands(&self) -> ConnectivityResult<Vec<Band>> {
        let lows = self.fmin.as_ref().map(FreqBound::values);
        let highs = self.fmax.as_ref().map(FreqBound::values);
        let (lows, highs) = match (lows, highs) {
            (None, None) => (vec![f64::NEG_INFINITY], vec![f64::INFINITY]),
            (Some(lows), None) => {
                let n = lows.len();
                (lows, vec![f64::INFINITY; n])
            }
            (None, Some(highs)) => (vec![f64::NEG_INFINITY; highs.len()], highs),
            (Some(lows), Some(highs)) => (lows, highs),
        };

        if lows.is_empty() || highs.is_empty() {
            return Err(ConnectivityError::invalid("fmin and fmax must not be empty"));
        }
        if lows.len() != highs.len() {
            return Err(ConnectivityError::invalid(format!(
                "fmin and fmax must have the same length, got {} and {}",
                lows.len(),
                highs.len()
            )));
        }

        lows.into_iter()
            .zip(highs)
            .enumerate()
            .map(|(i, (fmin, fmax))| {
                if fmin.is_nan() || fmax.is_nan() {
                    return Err(ConnectivityError::invalid(format!(
                        "band {i} has a NaN bound"
                    )));
                }
                if fmin > fmax {
                    return Err(ConnectivityError::invalid(format!(
                        "fmin must not exceed fmax, band {i} has fmin = {fmin} > fmax = {fmax}"
                    )));
                }
                Ok(Band::new(fmin, fmax))
            })
            .collect()
    }

    /// Checks everything that can be checked without seeing an epoch and returns the
    /// resolved bands.
    pub fn validate(&self) -> ConnectivityResult<Vec<Band>> {
        if !(self.sfreq > 0.0) || !self.sfreq.is_finite() {
            return Err(ConnectivityError::invalid(format!(
                "sfreq must be positive and finite, got {}",
                self.sfreq
            )));
        }
        if self.n_jobs == 0 {
            return Err(ConnectivityError::invalid("n_jobs must be at least 1"));
        }
        if let (Some(tmin), Some(tmax)) = (self.tmin, self.tmax) {
            if tmin > tmax {
                return Err(ConnectivityError::invalid(format!(
                    "tmin = {tmin} must not exceed tmax = {tmax}"
                )));
            }
        }
        if let Some(bw) = self.mt_bandwidth {
            if !(bw > 0.0) {
                return Err(ConnectivityError::invalid(format!(
                    "mt_bandwidth must be positive, got {bw}"
                )));
            }
        }
        if let Some(indices) = &self.indices {
            indices.validate()?;
        }
        self.bands()
    }
}
