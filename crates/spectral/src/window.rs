use apodize::hanning_iter;

/// Symmetric Hann window of length `n`.
///
/// A single-point window is `[1.0]`; the closed form would divide by zero.
pub fn hann(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => hanning_iter(n).collect(),
    }
}

/// Non-negative frequencies of a length-`n_times` DFT sampled at `sfreq`.
///
/// Matches the non-negative part of the usual `fftfreq` layout, so for even lengths the
/// Nyquist bin is not included.
pub fn frequency_grid(n_times: usize, sfreq: f64) -> Vec<f64> {
    let n_pos = (n_times + 1) / 2;
    (0..n_pos)
        .map(|k| k as f64 * sfreq / n_times as f64)
        .collect()
}
