//! Phase lag index and its unbiased squared variant.

use ndarray::Array2;

use super::{sign, AccumulatorState, ConValues, ConnectivityEstimator, EstimatorFactory, PairSpectra};

const SUM_SIGN: usize = 0;

/// Accumulates `sign(Im Cxy)` per epoch.
///
/// `pli` finalizes to `|mean sign|`; `pli2_unbiased` to `(n pli^2 - 1) / (n - 1)`, which is
/// undefined (NaN) for fewer than two epochs.
pub struct PliEstimator {
    unbiased: bool,
    state: AccumulatorState,
}

impl PliEstimator {
    pub fn new(unbiased: bool, n_cons: usize, n_freqs: usize) -> Self {
        Self {
            unbiased,
            state: AccumulatorState::new(1, 0, n_cons, n_freqs),
        }
    }
}

fn pli_name(unbiased: bool) -> &'static str {
    if unbiased {
        "pli2_unbiased"
    } else {
        "pli"
    }
}

impl ConnectivityEstimator for PliEstimator {
    fn name(&self) -> &str {
        pli_name(self.unbiased)
    }

    fn accumulate(&mut self, con_idx: usize, spectra: &PairSpectra<'_>) {
        let mut acc = self.state.real[SUM_SIGN].row_mut(con_idx);
        for (acc, csd) in acc.iter_mut().zip(spectra.csd) {
            *acc += sign(csd.im);
        }
    }

    fn state(&self) -> &AccumulatorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AccumulatorState {
        &mut self.state
    }

    fn finalize(&self) -> ConValues {
        let n = self.state.n_epochs as f64;
        let sums = &self.state.real[SUM_SIGN];
        let pli: Array2<f64> = if n > 0.0 {
            sums.mapv(|s| (s / n).abs())
        } else {
            Array2::zeros(sums.dim())
        };
        if !self.unbiased {
            return ConValues::Real(pli);
        }
        if n < 2.0 {
            return ConValues::Real(Array2::from_elem(pli.dim(), f64::NAN));
        }
        ConValues::Real(pli.mapv(|p| (n * p * p - 1.0) / (n - 1.0)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PliFactory {
    unbiased: bool,
}

impl PliFactory {
    pub fn new(unbiased: bool) -> Self {
        Self { unbiased }
    }
}

impl EstimatorFactory for PliFactory {
    fn name(&self) -> &str {
        pli_name(self.unbiased)
    }

    fn create(&self, n_cons: usize, n_freqs: usize) -> Box<dyn ConnectivityEstimator> {
        Box::new(PliEstimator::new(self.unbiased, n_cons, n_freqs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_support::run;
    use num_complex::Complex64;

    fn im(v: f64) -> Vec<Complex64> {
        vec![Complex64::new(1.0, v)]
    }

    #[test]
    fn consistent_lag_gives_one() {
        let epochs = vec![im(0.3), im(2.0), im(0.01), im(5.0)];
        let pli = run(&PliFactory::new(false), &epochs, &[1.0], &[1.0]).finalize();
        assert_eq!(pli.as_real().unwrap()[[0, 0]], 1.0);
        let pli2 = run(&PliFactory::new(true), &epochs, &[1.0], &[1.0]).finalize();
        assert!((pli2.as_real().unwrap()[[0, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn balanced_signs_cancel() {
        let epochs = vec![im(1.0), im(-1.0), im(0.5), im(-3.0), im(0.0)];
        let pli = run(&PliFactory::new(false), &epochs, &[1.0], &[1.0]).finalize();
        assert_eq!(pli.as_real().unwrap()[[0, 0]], 0.0);
        // n = 5, pli = 0: (0 - 1) / 4
        let pli2 = run(&PliFactory::new(true), &epochs, &[1.0], &[1.0]).finalize();
        assert!((pli2.as_real().unwrap()[[0, 0]] + 0.25).abs() < 1e-12);
    }

    #[test]
    fn unbiased_needs_two_epochs() {
        let pli2 = run(&PliFactory::new(true), &[im(1.0)], &[1.0], &[1.0]).finalize();
        assert!(pli2.as_real().unwrap()[[0, 0]].is_nan());
    }
}
