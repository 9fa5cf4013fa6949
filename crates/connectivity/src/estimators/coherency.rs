//! Coherence family: coh, cohy and imcoh share one set of running sums.

use ndarray::Array2;
use num_complex::Complex64;

use super::{AccumulatorState, ConValues, ConnectivityEstimator, EstimatorFactory, PairSpectra};

const SUM_CSD: usize = 0;
const SUM_PSD_X: usize = 0;
const SUM_PSD_Y: usize = 1;

/// Which reduction of the mean coherency to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoherencyKind {
    /// |Cxy| / sqrt(Pxx Pyy)
    Coh,
    /// Cxy / sqrt(Pxx Pyy), complex valued
    Cohy,
    /// Im(Cxy) / sqrt(Pxx Pyy)
    ImCoh,
}

impl CoherencyKind {
    pub fn name(&self) -> &'static str {
        match self {
            CoherencyKind::Coh => "coh",
            CoherencyKind::Cohy => "cohy",
            CoherencyKind::ImCoh => "imcoh",
        }
    }
}

pub struct CoherencyEstimator {
    kind: CoherencyKind,
    state: AccumulatorState,
}

impl CoherencyEstimator {
    pub fn new(kind: CoherencyKind, n_cons: usize, n_freqs: usize) -> Self {
        Self {
            kind,
            state: AccumulatorState::new(2, 1, n_cons, n_freqs),
        }
    }

    /// Mean cross-spectrum normalized by the mean powers; zero where either power is zero.
    fn coherency(&self) -> Array2<Complex64> {
        let csd = &self.state.complex[SUM_CSD];
        let psd_x = &self.state.real[SUM_PSD_X];
        let psd_y = &self.state.real[SUM_PSD_Y];
        // the epoch count cancels between numerator and denominator
        Array2::from_shape_fn(csd.dim(), |idx| {
            let denom = (psd_x[idx] * psd_y[idx]).sqrt();
            if denom > 0.0 {
                csd[idx] / denom
            } else {
                Complex64::new(0.0, 0.0)
            }
        })
    }
}

impl ConnectivityEstimator for CoherencyEstimator {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn accumulate(&mut self, con_idx: usize, spectra: &PairSpectra<'_>) {
        let mut csd = self.state.complex[SUM_CSD].row_mut(con_idx);
        for (acc, value) in csd.iter_mut().zip(spectra.csd) {
            *acc += value;
        }
        let mut psd_x = self.state.real[SUM_PSD_X].row_mut(con_idx);
        for (acc, value) in psd_x.iter_mut().zip(spectra.psd_x) {
            *acc += value;
        }
        let mut psd_y = self.state.real[SUM_PSD_Y].row_mut(con_idx);
        for (acc, value) in psd_y.iter_mut().zip(spectra.psd_y) {
            *acc += value;
        }
    }

    fn state(&self) -> &AccumulatorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AccumulatorState {
        &mut self.state
    }

    fn finalize(&self) -> ConValues {
        let coherency = self.coherency();
        match self.kind {
            CoherencyKind::Coh => ConValues::Real(coherency.mapv(|c| c.norm())),
            CoherencyKind::Cohy => ConValues::Complex(coherency),
            CoherencyKind::ImCoh => ConValues::Real(coherency.mapv(|c| c.im)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CoherencyFactory {
    kind: CoherencyKind,
}

impl CoherencyFactory {
    pub fn new(kind: CoherencyKind) -> Self {
        Self { kind }
    }
}

impl EstimatorFactory for CoherencyFactory {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn create(&self, n_cons: usize, n_freqs: usize) -> Box<dyn ConnectivityEstimator> {
        Box::new(CoherencyEstimator::new(self.kind, n_cons, n_freqs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_support::run;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn identical_phase_gives_unit_coherence() {
        // x = y up to a fixed phase: |Cxy|^2 = Pxx Pyy
        let epochs = vec![vec![c(0.0, 2.0), c(4.0, 0.0)]; 5];
        let est = run(&CoherencyFactory::new(CoherencyKind::Coh), &epochs, &[2.0, 4.0], &[2.0, 4.0]);
        let coh = est.finalize();
        let coh = coh.as_real().unwrap();
        assert!((coh[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((coh[[0, 1]] - 1.0).abs() < 1e-12);
        assert_eq!(est.state().n_epochs, 5);
    }

    #[test]
    fn cohy_and_imcoh_agree_with_coh() {
        let epochs = vec![
            vec![c(1.0, 1.0)],
            vec![c(0.5, -0.2)],
            vec![c(-0.3, 0.9)],
        ];
        let psd_x = [2.0];
        let psd_y = [1.5];
        let coh = run(&CoherencyFactory::new(CoherencyKind::Coh), &epochs, &psd_x, &psd_y).finalize();
        let cohy = run(&CoherencyFactory::new(CoherencyKind::Cohy), &epochs, &psd_x, &psd_y).finalize();
        let imcoh = run(&CoherencyFactory::new(CoherencyKind::ImCoh), &epochs, &psd_x, &psd_y).finalize();

        let mean = c(1.2 / 3.0, 1.7 / 3.0);
        let expected = mean / (2.0f64 * 1.5).sqrt();
        let cohy = cohy.as_complex().unwrap()[[0, 0]];
        assert!((cohy - expected).norm() < 1e-12);
        assert!((coh.as_real().unwrap()[[0, 0]] - expected.norm()).abs() < 1e-12);
        assert!((imcoh.as_real().unwrap()[[0, 0]] - expected.im).abs() < 1e-12);
    }

    #[test]
    fn zero_power_yields_zero() {
        let epochs = vec![vec![c(0.0, 0.0)]];
        let coh = run(&CoherencyFactory::new(CoherencyKind::Coh), &epochs, &[0.0], &[1.0]).finalize();
        assert_eq!(coh.as_real().unwrap()[[0, 0]], 0.0);
    }
}
