//! Epoch source: turns eager blocks or lazy epoch-like sequences into uniform,
//! optionally cropped (signals x samples) arrays.

use eeg_types::{EpochLike, EpochTiming};
use ndarray::{s, Array2};
use tracing::debug;

use crate::error::{ConnectivityError, ConnectivityResult};

/// Relative slack, in sample steps, when comparing sample times to the crop window.
const TIME_TOLERANCE: f64 = 1e-6;

/// Lazily validates and crops a sequence of epochs.
///
/// The first epoch fixes the expected (signals, samples) shape; any later epoch that
/// differs yields [`ConnectivityError::ShapeMismatch`]. Epochs without timing metadata are
/// assumed to start at t = 0 with spacing 1 / sfreq.
pub struct EpochSource<I> {
    inner: I,
    sfreq: f64,
    tmin: Option<f64>,
    tmax: Option<f64>,
    expected: Option<(usize, usize)>,
    position: usize,
}

impl<I, E> EpochSource<I>
where
    I: Iterator<Item = E>,
    E: EpochLike,
{
    pub fn new<T>(epochs: T, sfreq: f64, tmin: Option<f64>, tmax: Option<f64>) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            inner: epochs.into_iter(),
            sfreq,
            tmin,
            tmax,
            expected: None,
            position: 0,
        }
    }

    /// Number of epochs handed out so far.
    pub fn n_read(&self) -> usize {
        self.position
    }

    /// Shape fixed by the first epoch, once it has been read.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.expected
    }

    fn crop(&self, epoch: &E) -> ConnectivityResult<Array2<f64>> {
        let data = epoch.data();
        if self.tmin.is_none() && self.tmax.is_none() {
            return Ok(data.to_owned());
        }

        let timing = epoch
            .timing()
            .unwrap_or_else(|| EpochTiming::from_sfreq(self.sfreq));
        let tol = timing.tstep.abs() * TIME_TOLERANCE;
        let lo = self.tmin.unwrap_or(f64::NEG_INFINITY) - tol;
        let hi = self.tmax.unwrap_or(f64::INFINITY) + tol;

        let n_times = data.ncols();
        let start = (0..n_times).find(|&i| timing.time_of(i) >= lo);
        let end = (0..n_times).rev().find(|&i| timing.time_of(i) <= hi);
        match (start, end) {
            (Some(start), Some(end)) if start <= end => {
                Ok(data.slice(s![.., start..=end]).to_owned())
            }
            _ => Err(ConnectivityError::invalid(format!(
                "time window [{:?}, {:?}] selects no samples of epoch {} (first sample at {} s, step {} s)",
                self.tmin, self.tmax, self.position, timing.tmin, timing.tstep
            ))),
        }
    }
}

impl<I, E> Iterator for EpochSource<I>
where
    I: Iterator<Item = E>,
    E: EpochLike,
{
    type Item = ConnectivityResult<Array2<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        let epoch = self.inner.next()?;
        let result = self.crop(&epoch).and_then(|data| {
            let found = data.dim();
            match self.expected {
                None => {
                    debug!(
                        "First epoch: {} signals x {} samples",
                        found.0, found.1
                    );
                    self.expected = Some(found);
                    Ok(data)
                }
                Some(expected) if expected == found => Ok(data),
                Some(expected) => Err(ConnectivityError::ShapeMismatch {
                    epoch: self.position,
                    expected,
                    found,
                }),
            }
        });
        self.position += 1;
        Some(result)
    }
}
