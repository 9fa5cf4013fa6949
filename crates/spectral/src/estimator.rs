//! Spectral estimator: one epoch in, tapered Fourier coefficients out.

use eeg_types::SpectralMode;
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adaptive::{adaptive_weights, ADAPTIVE_MAX_ITER};
use crate::dpss::dpss_windows;
use crate::error::{SpectralError, SpectralResult};
use crate::window::{frequency_grid, hann};

/// Half time-bandwidth product used when no multitaper bandwidth is given.
pub const DEFAULT_HALF_NBW: f64 = 4.0;
/// Tapers at or below this concentration are dropped in low-bias mode.
pub const LOW_BIAS_THRESHOLD: f64 = 0.96;

/// Everything needed to build a [`SpectralEstimator`] for epochs of one length.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralConfig {
    pub mode: SpectralMode,
    pub sfreq: f64,
    pub n_times: usize,
    /// Full multitaper bandwidth in Hz. `None` means NW = 4.
    pub mt_bandwidth: Option<f64>,
    pub mt_adaptive: bool,
    pub mt_low_bias: bool,
}

impl SpectralConfig {
    pub fn new(mode: SpectralMode, sfreq: f64, n_times: usize) -> Self {
        Self {
            mode,
            sfreq,
            n_times,
            mt_bandwidth: None,
            mt_adaptive: false,
            mt_low_bias: true,
        }
    }
}

/// Complex spectra of one epoch, restricted to the requested signals and frequencies.
#[derive(Debug, Clone)]
pub struct EpochSpectra {
    /// Shaped (n_signals, n_tapers, n_freqs).
    pub coefs: Array3<Complex64>,
    /// Shaped (n_signals, n_tapers, n_freqs).
    pub weights: Array3<f64>,
}

impl EpochSpectra {
    pub fn n_signals(&self) -> usize {
        self.coefs.dim().0
    }

    pub fn n_freqs(&self) -> usize {
        self.coefs.dim().2
    }

    /// One-sided power `2 sum_k w^2 |x_k|^2 / sum_k w^2` of signal `sig`.
    pub fn psd(&self, sig: usize) -> Array1<f64> {
        let x = self.coefs.index_axis(Axis(0), sig);
        let w = self.weights.index_axis(Axis(0), sig);
        Array1::from_shape_fn(self.n_freqs(), |f| {
            let mut num = 0.0;
            let mut den = 0.0;
            for (c, wk) in x.column(f).iter().zip(w.column(f).iter()) {
                num += wk * wk * c.norm_sqr();
                den += wk * wk;
            }
            if den > 0.0 {
                2.0 * num / den
            } else {
                0.0
            }
        })
    }

    /// Writes the weighted cross-spectrum between signals `x` and `y` into `out`:
    /// `2 sum_k wx wy X_k conj(Y_k) / sqrt(sum_k wx^2 sum_k wy^2)`.
    pub fn cross_spectrum_into(&self, x: usize, y: usize, out: &mut [Complex64]) {
        let xs = self.coefs.index_axis(Axis(0), x);
        let ys = self.coefs.index_axis(Axis(0), y);
        let wx = self.weights.index_axis(Axis(0), x);
        let wy = self.weights.index_axis(Axis(0), y);
        for (f, slot) in out.iter_mut().enumerate() {
            let mut acc = Complex64::zero();
            let mut sx = 0.0;
            let mut sy = 0.0;
            for k in 0..xs.nrows() {
                let (a, b) = (wx[[k, f]], wy[[k, f]]);
                acc += xs[[k, f]] * ys[[k, f]].conj() * (a * b);
                sx += a * a;
                sy += b * b;
            }
            let denom = (sx * sy).sqrt();
            *slot = if denom > 0.0 {
                acc * (2.0 / denom)
            } else {
                Complex64::zero()
            };
        }
    }
}

/// Tapers, FFT plan and frequency grid for a fixed (sfreq, n_times, mode) configuration.
///
/// Built once per run and shared read-only between workers.
#[derive(Clone)]
pub struct SpectralEstimator {
    config: SpectralConfig,
    freqs: Vec<f64>,
    /// Shaped (n_tapers, n_times).
    tapers: Array2<f64>,
    eigvals: Array1<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for SpectralEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralEstimator")
            .field("config", &self.config)
            .field("n_freqs", &self.freqs.len())
            .field("n_tapers", &self.tapers.nrows())
            .finish()
    }
}

impl SpectralEstimator {
    pub fn new(config: SpectralConfig) -> SpectralResult<Self> {
        if !(config.sfreq > 0.0) || !config.sfreq.is_finite() {
            return Err(SpectralError::invalid(format!(
                "sampling rate must be positive, got {}",
                config.sfreq
            )));
        }
        if config.n_times == 0 {
            return Err(SpectralError::EmptyEpoch);
        }

        let (tapers, eigvals) = match config.mode {
            SpectralMode::Fft => {
                let window = Array1::from(hann(config.n_times));
                (window.insert_axis(Axis(0)), Array1::from_elem(1, 1.0))
            }
            SpectralMode::Multitaper => {
                let half_nbw = match config.mt_bandwidth {
                    Some(bw) => bw * config.n_times as f64 / (2.0 * config.sfreq),
                    None => DEFAULT_HALF_NBW,
                };
                if half_nbw < 0.5 {
                    return Err(SpectralError::invalid(format!(
                        "multitaper bandwidth too small: NW = {half_nbw:.3} < 0.5"
                    )));
                }
                let n_tapers_max = ((2.0 * half_nbw).floor() as usize).max(1);
                let mut dpss = dpss_windows(config.n_times, half_nbw, n_tapers_max)?;
                if config.mt_low_bias {
                    dpss = dpss.retain_concentrated(LOW_BIAS_THRESHOLD);
                }
                debug!(
                    "Multitaper: NW = {:.2}, {} tapers kept, concentrations {:?}",
                    half_nbw,
                    dpss.n_tapers(),
                    dpss.eigvals.to_vec()
                );
                (dpss.tapers, dpss.eigvals)
            }
        };

        let fft = FftPlanner::<f64>::new().plan_fft_forward(config.n_times);
        let freqs = frequency_grid(config.n_times, config.sfreq);

        Ok(Self {
            config,
            freqs,
            tapers,
            eigvals,
            fft,
        })
    }

    /// The full non-negative frequency grid.
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn n_tapers(&self) -> usize {
        self.tapers.nrows()
    }

    pub fn eigvals(&self) -> &Array1<f64> {
        &self.eigvals
    }

    pub fn is_adaptive(&self) -> bool {
        self.config.mode == SpectralMode::Multitaper
            && self.config.mt_adaptive
            && self.n_tapers() > 1
    }

    /// Transforms the rows `signals` of `epoch` and keeps the frequency bins `freq_idx`
    /// (indices into [`SpectralEstimator::freqs`]).
    pub fn compute(
        &self,
        epoch: ArrayView2<'_, f64>,
        signals: &[usize],
        freq_idx: &[usize],
    ) -> SpectralResult<EpochSpectra> {
        let (n_signals, n_times) = epoch.dim();
        if n_times != self.config.n_times {
            return Err(SpectralError::LengthMismatch {
                expected: self.config.n_times,
                found: n_times,
            });
        }
        if let Some(&bad) = signals.iter().find(|&&s| s >= n_signals) {
            return Err(SpectralError::SignalOutOfRange {
                index: bad,
                n_signals,
            });
        }
        if let Some(&bad) = freq_idx.iter().find(|&&f| f >= self.freqs.len()) {
            return Err(SpectralError::invalid(format!(
                "frequency index {bad} outside grid of {} bins",
                self.freqs.len()
            )));
        }

        let n_tapers = self.n_tapers();
        let n_pos = self.freqs.len();
        let mut coefs = Array3::<Complex64>::zeros((signals.len(), n_tapers, freq_idx.len()));
        let mut weights = Array3::<f64>::from_elem(
            (signals.len(), n_tapers, freq_idx.len()),
            1.0 / n_tapers as f64,
        );

        let mut buffer = vec![Complex64::zero(); n_times];
        let mut scratch = vec![Complex64::zero(); self.fft.get_inplace_scratch_len()];
        let mut full = Array2::<Complex64>::zeros((n_tapers, n_pos));

        for (out_sig, &sig) in signals.iter().enumerate() {
            let row = epoch.row(sig);
            let mean = row.mean().unwrap_or(0.0);

            for (k, taper) in self.tapers.rows().into_iter().enumerate() {
                for ((slot, &x), &t) in buffer.iter_mut().zip(row.iter()).zip(taper.iter()) {
                    *slot = Complex64::new((x - mean) * t, 0.0);
                }
                self.fft.process_with_scratch(&mut buffer, &mut scratch);
                for (f, value) in full.row_mut(k).iter_mut().enumerate() {
                    *value = buffer[f];
                }
            }

            for (j, &f) in freq_idx.iter().enumerate() {
                for k in 0..n_tapers {
                    coefs[[out_sig, k, j]] = full[[k, f]];
                }
            }

            if self.is_adaptive() {
                let adaptive = adaptive_weights(full.view(), self.eigvals.view(), ADAPTIVE_MAX_ITER);
                if !adaptive.converged {
                    warn!(
                        "Adaptive multitaper weights for signal {} did not converge after {} iterations",
                        sig, adaptive.iterations
                    );
                }
                for (j, &f) in freq_idx.iter().enumerate() {
                    for k in 0..n_tapers {
                        weights[[out_sig, k, j]] = adaptive.weights[[k, f]];
                    }
                }
            }
        }

        Ok(EpochSpectra { coefs, weights })
    }
}
