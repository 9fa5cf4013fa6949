//! Weighted phase lag index and its debiased squared variant.

use ndarray::Array2;

use super::{AccumulatorState, ConValues, ConnectivityEstimator, EstimatorFactory, PairSpectra};

const SUM_IM: usize = 0;
const SUM_ABS_IM: usize = 1;
const SUM_SQ_IM: usize = 2;

/// Accumulates `Im Cxy` and `|Im Cxy|` per epoch, plus `(Im Cxy)^2` for the debiased form.
///
/// With `S = sum Im`, `A = sum |Im|` and `Q = sum Im^2`:
/// `wpli = |S| / A` and `wpli2_debiased = (S^2 - Q) / (A^2 - Q)`.
/// Both are zero where the denominator vanishes.
pub struct WpliEstimator {
    debiased: bool,
    state: AccumulatorState,
}

impl WpliEstimator {
    pub fn new(debiased: bool, n_cons: usize, n_freqs: usize) -> Self {
        let n_sums = if debiased { 3 } else { 2 };
        Self {
            debiased,
            state: AccumulatorState::new(n_sums, 0, n_cons, n_freqs),
        }
    }
}

fn wpli_name(debiased: bool) -> &'static str {
    if debiased {
        "wpli2_debiased"
    } else {
        "wpli"
    }
}

fn ratio(num: f64, denom: f64) -> f64 {
    if denom == 0.0 {
        0.0
    } else {
        num / denom
    }
}

impl ConnectivityEstimator for WpliEstimator {
    fn name(&self) -> &str {
        wpli_name(self.debiased)
    }

    fn accumulate(&mut self, con_idx: usize, spectra: &PairSpectra<'_>) {
        for (f, csd) in spectra.csd.iter().enumerate() {
            let im = csd.im;
            self.state.real[SUM_IM][[con_idx, f]] += im;
            self.state.real[SUM_ABS_IM][[con_idx, f]] += im.abs();
            if self.debiased {
                self.state.real[SUM_SQ_IM][[con_idx, f]] += im * im;
            }
        }
    }

    fn state(&self) -> &AccumulatorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AccumulatorState {
        &mut self.state
    }

    fn finalize(&self) -> ConValues {
        let sum_im = &self.state.real[SUM_IM];
        let sum_abs = &self.state.real[SUM_ABS_IM];
        let values = if self.debiased {
            let sum_sq = &self.state.real[SUM_SQ_IM];
            Array2::from_shape_fn(sum_im.dim(), |idx| {
                let s = sum_im[idx];
                let a = sum_abs[idx];
                let q = sum_sq[idx];
                ratio(s * s - q, a * a - q)
            })
        } else {
            Array2::from_shape_fn(sum_im.dim(), |idx| ratio(sum_im[idx].abs(), sum_abs[idx]))
        };
        ConValues::Real(values)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WpliFactory {
    debiased: bool,
}

impl WpliFactory {
    pub fn new(debiased: bool) -> Self {
        Self { debiased }
    }
}

impl EstimatorFactory for WpliFactory {
    fn name(&self) -> &str {
        wpli_name(self.debiased)
    }

    fn create(&self, n_cons: usize, n_freqs: usize) -> Box<dyn ConnectivityEstimator> {
        Box::new(WpliEstimator::new(self.debiased, n_cons, n_freqs))
    }
}
