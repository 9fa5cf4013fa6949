//! Discrete prolate spheroidal sequences (Slepian tapers).
//!
//! The tapers are the eigenvectors of the symmetric tridiagonal matrix that commutes with
//! the time- and band-limiting operator. Only the `kmax` largest eigenpairs are needed,
//! so eigenvalues are located with Sturm-sequence bisection and the vectors recovered by
//! inverse iteration. The spectral concentration of each taper is then measured directly
//! from its autocorrelation.

use ndarray::{Array1, Array2};
use std::f64::consts::PI;

use crate::error::{SpectralError, SpectralResult};

const BISECTION_MAX_ITER: usize = 200;
const INVERSE_ITERATIONS: usize = 3;

/// A set of Slepian tapers with their concentration ratios.
#[derive(Debug, Clone)]
pub struct Dpss {
    /// One taper per row, shaped (n_tapers, n_times), each with unit energy.
    pub tapers: Array2<f64>,
    /// Fraction of each taper's energy inside the [-W, W] band, in (0, 1].
    pub eigvals: Array1<f64>,
}

impl Dpss {
    pub fn n_tapers(&self) -> usize {
        self.tapers.nrows()
    }

    /// Keeps only the tapers whose concentration exceeds `threshold`.
    ///
    /// If none pass, the best-concentrated taper is kept on its own.
    pub fn retain_concentrated(self, threshold: f64) -> Self {
        let mut keep: Vec<usize> = (0..self.eigvals.len())
            .filter(|&k| self.eigvals[k] > threshold)
            .collect();
        if keep.is_empty() {
            let best = self
                .eigvals
                .iter()
                .enumerate()
                .fold(0, |best, (k, &v)| if v > self.eigvals[best] { k } else { best });
            keep.push(best);
        }
        let tapers = self.tapers.select(ndarray::Axis(0), &keep);
        let eigvals = self.eigvals.select(ndarray::Axis(0), &keep);
        Self { tapers, eigvals }
    }
}

/// Computes the first `kmax` Slepian tapers of length `n` for half time-bandwidth
/// product `half_nbw` (NW).
pub fn dpss_windows(n: usize, half_nbw: f64, kmax: usize) -> SpectralResult<Dpss> {
    if n < 2 {
        return Err(SpectralError::invalid(format!(
            "tapers need at least 2 samples, got {n}"
        )));
    }
    if kmax == 0 || kmax > n {
        return Err(SpectralError::invalid(format!(
            "number of tapers must be in 1..={n}, got {kmax}"
        )));
    }
    if !(half_nbw > 0.0) || half_nbw >= n as f64 / 2.0 {
        return Err(SpectralError::invalid(format!(
            "half time-bandwidth product must be in (0, {}), got {half_nbw}",
            n as f64 / 2.0
        )));
    }

    let w = half_nbw / n as f64;
    let cos_w = (2.0 * PI * w).cos();
    let diag: Vec<f64> = (0..n)
        .map(|i| {
            let c = (n as f64 - 1.0 - 2.0 * i as f64) / 2.0;
            c * c * cos_w
        })
        .collect();
    let off: Vec<f64> = (1..n)
        .map(|i| i as f64 * (n - i) as f64 / 2.0)
        .collect();

    let mut tapers = Array2::<f64>::zeros((kmax, n));
    for k in 0..kmax {
        // k-th largest eigenvalue is the (n - 1 - k)-th smallest
        let lambda = kth_smallest_eigenvalue(&diag, &off, n - 1 - k);
        let mut v = inverse_iteration(&diag, &off, lambda);
        fix_sign(&mut v, k);
        tapers.row_mut(k).assign(&Array1::from(v));
    }

    let eigvals = Array1::from_iter(
        tapers
            .rows()
            .into_iter()
            .map(|taper| concentration(&taper.to_vec(), w)),
    );

    Ok(Dpss { tapers, eigvals })
}

/// Number of eigenvalues of the tridiagonal matrix strictly below `x`.
fn sturm_count(diag: &[f64], off: &[f64], x: f64, pivmin: f64) -> usize {
    let mut count = 0;
    let mut q = diag[0] - x;
    if q.abs() <= pivmin {
        q = -pivmin;
    }
    if q < 0.0 {
        count += 1;
    }
    for i in 1..diag.len() {
        q = diag[i] - x - off[i - 1] * off[i - 1] / q;
        if q.abs() <= pivmin {
            q = -pivmin;
        }
        if q < 0.0 {
            count += 1;
        }
    }
    count
}

fn kth_smallest_eigenvalue(diag: &[f64], off: &[f64], k: usize) -> f64 {
    let n = diag.len();
    // Gershgorin bounds
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for i in 0..n {
        let radius = if i > 0 { off[i - 1].abs() } else { 0.0 }
            + if i + 1 < n { off[i].abs() } else { 0.0 };
        lo = lo.min(diag[i] - radius);
        hi = hi.max(diag[i] + radius);
    }
    let max_off_sq = off.iter().fold(0.0f64, |m, &e| m.max(e * e));
    let pivmin = f64::MIN_POSITIVE * max_off_sq.max(1.0);

    for _ in 0..BISECTION_MAX_ITER {
        let mid = 0.5 * (lo + hi);
        if hi - lo <= 2.0 * f64::EPSILON * lo.abs().max(hi.abs()) {
            break;
        }
        if sturm_count(diag, off, mid, pivmin) > k {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Recovers the unit eigenvector for eigenvalue `lambda` by inverse iteration.
fn inverse_iteration(diag: &[f64], off: &[f64], lambda: f64) -> Vec<f64> {
    let n = diag.len();
    let scale = diag
        .iter()
        .chain(off.iter())
        .fold(0.0f64, |m, &v| m.max(v.abs()))
        .max(1.0);
    let tiny = f64::EPSILON * scale;

    // Deterministic start vector with components along every eigenvector,
    // symmetric and antisymmetric alike.
    let mut v: Vec<f64> = (0..n)
        .map(|i| 1.0 + (i as f64 * 0.618_033_988_749_895).fract())
        .collect();
    normalize(&mut v);

    for _ in 0..INVERSE_ITERATIONS {
        let shifted: Vec<f64> = diag.iter().map(|&d| d - lambda).collect();
        solve_tridiagonal(off, shifted, off.to_vec(), &mut v, tiny);
        normalize(&mut v);
    }
    v
}

/// Solves a tridiagonal system in place with partial pivoting.
///
/// `dl` and `du` are the sub- and super-diagonals, `d` the diagonal. Zero pivots are
/// replaced by `tiny`, which is what inverse iteration needs when the shift is an exact
/// eigenvalue.
fn solve_tridiagonal(dl: &[f64], mut d: Vec<f64>, mut du: Vec<f64>, b: &mut [f64], tiny: f64) {
    let n = d.len();
    let mut dl = dl.to_vec();
    if n == 1 {
        b[0] /= if d[0] == 0.0 { tiny } else { d[0] };
        return;
    }

    for i in 0..n - 1 {
        if d[i].abs() >= dl[i].abs() {
            if d[i] == 0.0 {
                d[i] = tiny;
            }
            let fact = dl[i] / d[i];
            d[i + 1] -= fact * du[i];
            b[i + 1] -= fact * b[i];
            dl[i] = 0.0;
        } else {
            // swap rows i and i + 1
            let fact = d[i] / dl[i];
            d[i] = dl[i];
            let temp = d[i + 1];
            d[i + 1] = du[i] - fact * temp;
            if i + 2 < n {
                dl[i] = du[i + 1];
                du[i + 1] = -fact * dl[i];
            } else {
                dl[i] = 0.0;
            }
            du[i] = temp;
            let temp = b[i];
            b[i] = b[i + 1];
            b[i + 1] = temp - fact * b[i + 1];
        }
    }
    if d[n - 1] == 0.0 {
        d[n - 1] = tiny;
    }

    b[n - 1] /= d[n - 1];
    b[n - 2] = (b[n - 2] - du[n - 2] * b[n - 1]) / d[n - 2];
    for i in (0..n - 2).rev() {
        b[i] = (b[i] - du[i] * b[i + 1] - dl[i] * b[i + 2]) / d[i];
    }
}

fn normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Symmetric tapers sum to a positive value; antisymmetric ones start with a positive lobe.
fn fix_sign(v: &mut [f64], order: usize) {
    let n = v.len();
    let flip = if order % 2 == 0 {
        v.iter().sum::<f64>() < 0.0
    } else {
        v[..n / 2].iter().sum::<f64>() < 0.0
    };
    if flip {
        v.iter_mut().for_each(|x| *x = -*x);
    }
}

/// Energy fraction of a unit-norm taper inside [-w, w] (cycles per sample).
fn concentration(taper: &[f64], w: f64) -> f64 {
    let n = taper.len();
    let mut total = 2.0 * w * taper.iter().map(|x| x * x).sum::<f64>();
    for lag in 1..n {
        let rho: f64 = taper[..n - lag]
            .iter()
            .zip(&taper[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let kernel = (2.0 * PI * w * lag as f64).sin() / (PI * lag as f64);
        total += 2.0 * kernel * rho;
    }
    total
}
