use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Timing metadata for an epoch: the time of its first sample and the sample spacing,
/// both in seconds.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EpochTiming {
    pub tmin: f64,
    pub tstep: f64,
}

impl EpochTiming {
    pub fn new(tmin: f64, tstep: f64) -> Self {
        Self { tmin, tstep }
    }

    /// Timing implied by a bare data block: first sample at t = 0, spacing 1 / sfreq.
    pub fn from_sfreq(sfreq: f64) -> Self {
        Self {
            tmin: 0.0,
            tstep: 1.0 / sfreq,
        }
    }

    /// Time in seconds of the sample at `index`.
    pub fn time_of(&self, index: usize) -> f64 {
        self.tmin + index as f64 * self.tstep
    }
}

/// Anything that can hand out one trial's (signals x samples) data block.
///
/// Objects that know when their first sample was taken report it through
/// [`EpochLike::timing`]; bare arrays return `None` and are assumed to start at t = 0.
pub trait EpochLike {
    /// The epoch's samples, shaped (n_signals, n_times).
    fn data(&self) -> ArrayView2<'_, f64>;

    fn timing(&self) -> Option<EpochTiming> {
        None
    }
}

/// An owned epoch with optional timing metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Epoch {
    pub data: Array2<f64>,
    #[serde(default)]
    pub timing: Option<EpochTiming>,
}

impl Epoch {
    pub fn new(data: Array2<f64>) -> Self {
        Self { data, timing: None }
    }

    pub fn with_timing(data: Array2<f64>, tmin: f64, tstep: f64) -> Self {
        Self {
            data,
            timing: Some(EpochTiming::new(tmin, tstep)),
        }
    }

    pub fn n_signals(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }
}

impl EpochLike for Epoch {
    fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    fn timing(&self) -> Option<EpochTiming> {
        self.timing
    }
}

impl EpochLike for Array2<f64> {
    fn data(&self) -> ArrayView2<'_, f64> {
        self.view()
    }
}

impl<'a> EpochLike for ArrayView2<'a, f64> {
    fn data(&self) -> ArrayView2<'_, f64> {
        self.view()
    }
}

impl<T: EpochLike + ?Sized> EpochLike for &T {
    fn data(&self) -> ArrayView2<'_, f64> {
        (**self).data()
    }

    fn timing(&self) -> Option<EpochTiming> {
        (**self).timing()
    }
}
