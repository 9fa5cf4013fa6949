//! Thomson adaptive taper weighting.
//!
//! Alternates between the weighted multitaper power estimate
//!
//! ```text
//! S(f) = sum_k |d_k(f)|^2 |y_k(f)|^2 / sum_k |d_k(f)|^2
//! ```
//!
//! and the weights
//!
//! ```text
//! d_k(f) = sqrt(lambda_k) S(f) / (lambda_k S(f) + (1 - lambda_k) sigma^2)
//! ```
//!
//! where `lambda_k` are the taper concentrations and `sigma^2` is the signal variance,
//! which stands in for the expected broadband leakage of each taper.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use num_complex::Complex64;

pub const ADAPTIVE_MAX_ITER: usize = 150;
const CONVERGENCE_TOL: f64 = 1e-10;

/// Per-taper, per-frequency weights for one signal.
#[derive(Debug, Clone)]
pub struct AdaptiveWeights {
    /// Shaped (n_tapers, n_freqs).
    pub weights: Array2<f64>,
    pub converged: bool,
    pub iterations: usize,
}

/// Weighted power estimate `sum_k w_k^2 |x_k|^2 / sum_k w_k^2` at every frequency.
fn weighted_power(x_mt: ArrayView2<'_, Complex64>, weights: ArrayView2<'_, f64>) -> Array1<f64> {
    let n_freqs = x_mt.ncols();
    Array1::from_shape_fn(n_freqs, |f| {
        let mut num = 0.0;
        let mut den = 0.0;
        for (x, w) in x_mt.column(f).iter().zip(weights.column(f).iter()) {
            let w2 = w * w;
            num += w2 * x.norm_sqr();
            den += w2;
        }
        if den > 0.0 {
            num / den
        } else {
            0.0
        }
    })
}

/// Computes adaptive weights for the taper spectra of a single signal.
///
/// `x_mt` is shaped (n_tapers, n_freqs) and should cover the full non-negative frequency
/// grid, since the signal variance is estimated from it. Runs at most `max_iter`
/// refinements and stops early once the mean-square change of the weights is below
/// 1e-10 at every frequency.
pub fn adaptive_weights(
    x_mt: ArrayView2<'_, Complex64>,
    eigvals: ArrayView1<'_, f64>,
    max_iter: usize,
) -> AdaptiveWeights {
    let (n_tapers, n_freqs) = x_mt.dim();
    let rt_eig = eigvals.mapv(f64::sqrt);

    let fixed = Array2::from_shape_fn((n_tapers, n_freqs), |(k, _)| rt_eig[k]);
    if n_tapers < 2 {
        return AdaptiveWeights {
            weights: fixed,
            converged: true,
            iterations: 0,
        };
    }

    let variance = weighted_power(x_mt, fixed.view()).mean().unwrap_or(0.0);

    // start from the two best-concentrated tapers only
    let head = x_mt.slice(ndarray::s![..2, ..]);
    let mut psd = weighted_power(head, fixed.slice(ndarray::s![..2, ..]));

    let mut previous = Array2::<f64>::zeros((n_tapers, n_freqs));
    let mut weights = fixed.clone();
    for iteration in 0..max_iter {
        for k in 0..n_tapers {
            let lambda = eigvals[k];
            for f in 0..n_freqs {
                let denom = lambda * psd[f] + (1.0 - lambda) * variance;
                weights[[k, f]] = if denom > 0.0 {
                    rt_eig[k] * psd[f] / denom
                } else {
                    rt_eig[k]
                };
            }
        }

        let worst = (0..n_freqs)
            .map(|f| {
                (0..n_tapers)
                    .map(|k| (previous[[k, f]] - weights[[k, f]]).powi(2))
                    .sum::<f64>()
                    / n_tapers as f64
            })
            .fold(0.0f64, f64::max);
        if worst < CONVERGENCE_TOL {
            return AdaptiveWeights {
                weights,
                converged: true,
                iterations: iteration + 1,
            };
        }

        psd = weighted_power(x_mt, weights.view());
        previous.assign(&weights);
    }

    AdaptiveWeights {
        weights,
        converged: false,
        iterations: max_iter,
    }
}
