//! Frequency binner: selects the bins that feed the accumulators and optionally averages
//! them per band.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div};

use crate::config::Band;
use crate::error::{ConnectivityError, ConnectivityResult};
use crate::estimators::ConValues;

/// Frequencies that go with the connectivity output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frequencies {
    /// One column per kept frequency.
    Grid(Vec<f64>),
    /// One column per band; each entry lists the frequencies averaged into it.
    Bands(Vec<Vec<f64>>),
}

impl Frequencies {
    pub fn as_grid(&self) -> Option<&[f64]> {
        match self {
            Frequencies::Grid(freqs) => Some(freqs),
            Frequencies::Bands(_) => None,
        }
    }

    pub fn as_bands(&self) -> Option<&[Vec<f64>]> {
        match self {
            Frequencies::Bands(bands) => Some(bands),
            Frequencies::Grid(_) => None,
        }
    }
}

/// Maps the spectral frequency grid onto the requested bands.
///
/// A grid bin is kept when its position is a multiple of `fskip + 1` and it falls inside
/// at least one band (bounds inclusive).
#[derive(Debug, Clone)]
pub struct FrequencyBinner {
    /// Indices of the kept bins in the full grid.
    kept: Vec<usize>,
    freqs: Vec<f64>,
    /// Per band, positions into `kept`.
    band_idx: Vec<Vec<usize>>,
    faverage: bool,
}

impl FrequencyBinner {
    pub fn new(
        grid: &[f64],
        bands: &[Band],
        fskip: usize,
        faverage: bool,
    ) -> ConnectivityResult<Self> {
        if bands.is_empty() {
            return Err(ConnectivityError::invalid("at least one frequency band is required"));
        }
        let step = fskip + 1;
        let kept: Vec<usize> = (0..grid.len())
            .step_by(step)
            .filter(|&k| bands.iter().any(|band| band.contains(grid[k])))
            .collect();
        let freqs: Vec<f64> = kept.iter().map(|&k| grid[k]).collect();

        let band_idx = bands
            .iter()
            .map(|band| {
                let idx: Vec<usize> = freqs
                    .iter()
                    .enumerate()
                    .filter(|(_, &f)| band.contains(f))
                    .map(|(i, _)| i)
                    .collect();
                if idx.is_empty() {
                    Err(ConnectivityError::invalid(format!(
                        "there are no frequency points between fmin = {} and fmax = {} Hz",
                        band.fmin, band.fmax
                    )))
                } else {
                    Ok(idx)
                }
            })
            .collect::<ConnectivityResult<Vec<_>>>()?;

        Ok(Self {
            kept,
            freqs,
            band_idx,
            faverage,
        })
    }

    /// Indices into the full grid of the bins to accumulate.
    pub fn kept_indices(&self) -> &[usize] {
        &self.kept
    }

    /// Frequencies of the kept bins.
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// Number of output columns.
    pub fn n_out(&self) -> usize {
        if self.faverage {
            self.band_idx.len()
        } else {
            self.freqs.len()
        }
    }

    pub fn output_frequencies(&self) -> Frequencies {
        if self.faverage {
            Frequencies::Bands(
                self.band_idx
                    .iter()
                    .map(|idx| idx.iter().map(|&i| self.freqs[i]).collect())
                    .collect(),
            )
        } else {
            Frequencies::Grid(self.freqs.clone())
        }
    }

    /// Collapses each band to its arithmetic mean when averaging; otherwise a no-op.
    pub fn reduce(&self, values: ConValues) -> ConValues {
        if !self.faverage {
            return values;
        }
        match values {
            ConValues::Real(v) => ConValues::Real(band_means(&v, &self.band_idx)),
            ConValues::Complex(v) => ConValues::Complex(band_means(&v, &self.band_idx)),
        }
    }
}

fn band_means<A>(values: &Array2<A>, band_idx: &[Vec<usize>]) -> Array2<A>
where
    A: Copy + Default + Add<Output = A> + Div<f64, Output = A>,
{
    Array2::from_shape_fn((values.nrows(), band_idx.len()), |(con, band)| {
        let idx = &band_idx[band];
        let sum = idx
            .iter()
            .fold(A::default(), |acc, &f| acc + values[[con, f]]);
        sum / idx.len() as f64
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use proptest::prelude::*;

    fn grid(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|k| k as f64 * step).collect()
    }

    #[test]
    fn keeps_inclusive_band_edges() {
        let g = grid(11, 1.0);
        let binner = FrequencyBinner::new(&g, &[Band::new(2.0, 5.0)], 0, false).unwrap();
        assert_eq!(binner.kept_indices(), &[2, 3, 4, 5]);
        assert_eq!(binner.output_frequencies(), Frequencies::Grid(vec![2.0, 3.0, 4.0, 5.0]));
        assert_eq!(binner.n_out(), 4);
    }

    #[test]
    fn fskip_decimates_the_full_grid() {
        let g = grid(11, 1.0);
        let binner = FrequencyBinner::new(&g, &[Band::new(1.0, 9.0)], 1, false).unwrap();
        assert_eq!(binner.kept_indices(), &[2, 4, 6, 8]);
    }

    #[test]
    fn averaging_collapses_each_band() {
        let g = grid(10, 1.0);
        let bands = [Band::new(0.0, 4.0), Band::new(4.0, 9.0)];
        let binner = FrequencyBinner::new(&g, &bands, 1, true).unwrap();
        assert_eq!(
            binner.output_frequencies(),
            Frequencies::Bands(vec![vec![0.0, 2.0, 4.0], vec![4.0, 6.0, 8.0]])
        );
        assert_eq!(binner.n_out(), 2);

        let values = Array2::from_shape_fn((2, binner.freqs().len()), |(c, f)| (c * 10 + f) as f64);
        let reduced = binner.reduce(ConValues::Real(values));
        let reduced = reduced.as_real().unwrap();
        assert_eq!(reduced.dim(), (2, 2));
        // kept = [0, 2, 4, 6, 8] at positions 0..5
        assert!((reduced[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((reduced[[0, 1]] - 3.0).abs() < 1e-12);
        assert!((reduced[[1, 1]] - 13.0).abs() < 1e-12);

        let complex = Array2::from_elem((1, 5), Complex64::new(1.0, -2.0));
        let reduced = binner.reduce(ConValues::Complex(complex));
        assert_eq!(reduced.as_complex().unwrap()[[0, 1]], Complex64::new(1.0, -2.0));
    }

    #[test]
    fn empty_band_is_invalid() {
        let g = grid(10, 1.0);
        let err = FrequencyBinner::new(&g, &[Band::new(3.2, 3.8)], 0, false).unwrap_err();
        assert!(matches!(err, ConnectivityError::InvalidParameter { .. }));
        // the decimated grid can empty a band too
        assert!(FrequencyBinner::new(&g, &[Band::new(3.0, 3.0)], 1, false).is_err());
    }

    proptest! {
        #[test]
        fn band_frequencies_stay_inside_their_band(
            n in 10usize..400,
            fskip in 0usize..4,
            split in 0.1f64..0.9,
        ) {
            let g = grid(n, 0.5);
            let top = g[n - 1];
            let bands = [Band::new(0.0, top * split), Band::new(top * split, top)];
            if let Ok(binner) = FrequencyBinner::new(&g, &bands, fskip, true) {
                let freqs = binner.output_frequencies();
                let per_band = freqs.as_bands().unwrap();
                prop_assert_eq!(per_band.len(), 2);
                for (band, freqs) in bands.iter().zip(per_band) {
                    prop_assert!(!freqs.is_empty());
                    for &f in freqs {
                        prop_assert!(band.contains(f));
                    }
                }
                for &k in binner.kept_indices() {
                    prop_assert_eq!(k % (fskip + 1), 0);
                }
            }
        }
    }
}
