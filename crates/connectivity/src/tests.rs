//! End-to-end tests of the connectivity pipeline.

use crate::api::{spectral_connectivity, spectral_connectivity_with_registry, ConArray};
use crate::binning::Frequencies;
use crate::config::{ConnectivityParams, FreqBound, Indices};
use crate::error::ConnectivityError;
use crate::estimators::{AccumulatorState, ConValues, ConnectivityEstimator, EstimatorFactory, PairSpectra};
use crate::registry::{EstimatorRegistry, Method};

use eeg_types::{Epoch, SpectralMode};
use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::sync::Arc;

const METHODS: [&str; 7] = [
    "coh",
    "cohy",
    "imcoh",
    "pli",
    "pli2_unbiased",
    "wpli",
    "wpli2_debiased",
];

fn random_epochs(n_epochs: usize, n_signals: usize, n_times: usize, seed: u64) -> Array3<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_fn((n_epochs, n_signals, n_times), |_| rng.sample(StandardNormal))
}

fn grid_len(freqs: &Frequencies) -> usize {
    freqs.as_grid().map(<[f64]>::len).unwrap_or_default()
}

/// Plain coherence written against the public estimator traits only.
struct SummedCoherence {
    state: AccumulatorState,
}

impl ConnectivityEstimator for SummedCoherence {
    fn name(&self) -> &str {
        "summed_coh"
    }

    fn accumulate(&mut self, con_idx: usize, spectra: &PairSpectra<'_>) {
        for f in 0..spectra.csd.len() {
            self.state.complex[0][[con_idx, f]] += spectra.csd[f];
            self.state.real[0][[con_idx, f]] += spectra.psd_x[f];
            self.state.real[1][[con_idx, f]] += spectra.psd_y[f];
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
        let csd = &self.state.complex[0];
        let (psd_x, psd_y) = (&self.state.real[0], &self.state.real[1]);
        ConValues::Real(Array2::from_shape_fn(csd.dim(), |idx| {
            (csd[idx] / n).norm() / ((psd_x[idx] / n) * (psd_y[idx] / n)).sqrt()
        }))
    }
}

struct SummedCoherenceFactory;

impl EstimatorFactory for SummedCoherenceFactory {
    fn name(&self) -> &str {
        "summed_coh"
    }

    fn create(&self, n_cons: usize, n_freqs: usize) -> Box<dyn ConnectivityEstimator> {
        Box::new(SummedCoherence {
            state: AccumulatorState::new(2, 1, n_cons, n_freqs),
        })
    }
}

#[test]
fn output_shape_follows_indices_for_every_method_and_mode() {
    let data = random_epochs(5, 3, 200, 7);
    let explicit = Indices::new(vec![0, 1], vec![2, 2]).unwrap();

    for mode in [SpectralMode::Fft, SpectralMode::Multitaper] {
        for method in METHODS {
            let params = ConnectivityParams::new(100.0).with_mode(mode);
            let full = spectral_connectivity(data.outer_iter(), &[method.into()], &params).unwrap();
            let n_freqs = grid_len(&full.freqs);
            assert!(n_freqs > 0);
            assert_eq!(full.connectivity[0].shape(), &[3, 3, n_freqs], "{method} / {mode}");
            assert_eq!(full.n_epochs, 5);

            let params = params.with_indices(explicit.clone());
            let pairs = spectral_connectivity(data.outer_iter(), &[method.into()], &params).unwrap();
            assert_eq!(pairs.connectivity[0].shape(), &[2, n_freqs], "{method} / {mode}");
            assert_eq!(pairs.metadata[0].method, method);
        }
    }
}

#[test]
fn dense_output_fills_only_the_lower_triangle() {
    let data = random_epochs(4, 3, 100, 11);
    let params = ConnectivityParams::new(50.0);
    let out = spectral_connectivity(data.outer_iter(), &["coh".into()], &params).unwrap();
    let coh = out.connectivity[0].as_real().unwrap();
    for seed in 0..3 {
        for target in 0..3 {
            let filled = coh.index_axis(Axis(0), seed).index_axis(Axis(0), target).iter().any(|&v| v != 0.0);
            assert_eq!(filled, target < seed, "[{seed}, {target}]");
        }
    }
}

#[test]
fn complex_methods_return_complex_arrays() {
    let data = random_epochs(3, 2, 128, 3);
    let params = ConnectivityParams::new(64.0);
    let out = spectral_connectivity(data.outer_iter(), &["cohy".into(), "imcoh".into()], &params).unwrap();
    assert!(matches!(out.connectivity[0], ConArray::Complex(_)));
    assert!(matches!(out.connectivity[1], ConArray::Real(_)));
}

#[test]
fn invalid_parameters_are_rejected_before_reading_epochs() {
    let data = random_epochs(2, 2, 100, 1);
    let cases: Vec<(Vec<Method>, Option<FreqBound>, Option<FreqBound>)> = vec![
        (vec!["notamethod".into()], None, None),
        (vec!["coh".into()], Some(10.0.into()), Some(5.0.into())),
        (
            vec!["coh".into()],
            Some(vec![0.0, 11.0].into()),
            Some(vec![5.0, 10.0].into()),
        ),
        (
            vec!["coh".into()],
            Some(vec![11.0].into()),
            Some(vec![12.0, 15.0].into()),
        ),
        (Vec::new(), None, None),
    ];

    for (methods, fmin, fmax) in cases {
        let mut params = ConnectivityParams::new(100.0);
        params.fmin = fmin;
        params.fmax = fmax;
        // a source that fails if it is ever read
        let epochs = data.outer_iter().map(|_| -> Array2<f64> { panic!("epoch read") });
        let err = spectral_connectivity(epochs, &methods, &params).unwrap_err();
        assert!(
            matches!(err, ConnectivityError::InvalidParameter { .. }),
            "{methods:?}: {err}"
        );
    }
}

#[test]
fn empty_input_and_bad_shapes_fail() {
    let params = ConnectivityParams::new(100.0);
    let none: Vec<Array2<f64>> = Vec::new();
    assert!(matches!(
        spectral_connectivity(none, &["coh".into()], &params),
        Err(ConnectivityError::NoEpochs)
    ));

    let epochs = vec![Array2::<f64>::zeros((2, 100)), Array2::zeros((2, 100)), Array2::zeros((3, 100))];
    assert!(matches!(
        spectral_connectivity(epochs.iter(), &["coh".into()], &params),
        Err(ConnectivityError::ShapeMismatch { epoch: 2, .. })
    ));

    let single = vec![Array2::<f64>::zeros((1, 100))];
    assert!(spectral_connectivity(single.iter(), &["coh".into()], &params).is_err());

    let params = params.with_indices(Indices::new(vec![0], vec![5]).unwrap());
    let epochs = random_epochs(2, 2, 100, 5);
    assert!(matches!(
        spectral_connectivity(epochs.outer_iter(), &["coh".into()], &params),
        Err(ConnectivityError::InvalidParameter { .. })
    ));
}

#[test]
fn band_below_the_five_cycle_frequency_is_empty() {
    // 200 samples at 100 Hz: nothing usable below 2.5 Hz
    let data = random_epochs(2, 2, 200, 9);
    let params = ConnectivityParams::new(100.0).with_bands(0.0, 2.0);
    let err = spectral_connectivity(data.outer_iter(), &["coh".into()], &params).unwrap_err();
    assert!(matches!(err, ConnectivityError::InvalidParameter { .. }));

    let params = ConnectivityParams::new(100.0);
    let out = spectral_connectivity(data.outer_iter(), &["coh".into()], &params).unwrap();
    let freqs = out.freqs.as_grid().unwrap();
    assert!((freqs[0] - 2.5).abs() < 1e-12);
    assert!(freqs.iter().all(|&f| f < 50.0));
}

#[test]
fn time_window_crops_every_epoch() {
    let data = random_epochs(3, 2, 200, 13);
    let epochs: Vec<Epoch> = data
        .outer_iter()
        .map(|e| Epoch::with_timing(e.to_owned(), -1.0, 0.01))
        .collect();
    let mut params = ConnectivityParams::new(100.0);
    params.tmin = Some(0.0);
    params.tmax = Some(0.99);
    let out = spectral_connectivity(&epochs, &["wpli".into()], &params).unwrap();
    // 100 samples left: 1 Hz resolution starting at the five-cycle frequency
    let freqs = out.freqs.as_grid().unwrap();
    assert!((freqs[0] - 5.0).abs() < 1e-12);
    assert!((freqs[1] - 6.0).abs() < 1e-12);
    assert_eq!(out.n_epochs, 3);
}

#[test]
fn custom_estimator_matches_builtin_coherence() {
    let data = random_epochs(6, 3, 256, 21);
    let params = ConnectivityParams::new(128.0).with_adaptive(true);
    let methods = [Method::from("coh"), Method::custom(SummedCoherenceFactory)];
    let out = spectral_connectivity(data.outer_iter(), &methods, &params).unwrap();

    assert_eq!(out.connectivity.len(), 2);
    assert_eq!(out.metadata[0].method, "coh");
    assert_eq!(out.metadata[1].method, "summed_coh");
    assert!(out.metadata.iter().all(|m| m.adaptive && m.n_epochs == 6));

    let builtin = out.connectivity[0].as_real().unwrap();
    let custom = out.connectivity[1].as_real().unwrap();
    assert_eq!(builtin.shape(), custom.shape());
    for (a, b) in builtin.iter().zip(custom.iter()) {
        if *a == 0.0 {
            // upper triangle and diagonal are left empty
            continue;
        }
        assert!((a - b).abs() < 1e-10, "{a} vs {b}");
    }
}

#[test]
fn registered_estimators_resolve_by_name() {
    let mut registry = EstimatorRegistry::builtin();
    registry.register(Arc::new(SummedCoherenceFactory));
    let data = random_epochs(3, 2, 128, 4);
    let params = ConnectivityParams::new(64.0).with_mode(SpectralMode::Fft);
    let out = spectral_connectivity_with_registry(
        data.outer_iter(),
        &["summed_coh".into()],
        &params,
        &registry,
    )
    .unwrap();
    assert_eq!(out.metadata[0].method, "summed_coh");
    assert_eq!(out.metadata[0].n_tapers, 1);
    assert!(!out.metadata[0].adaptive);
}

#[test]
fn params_from_json_drive_a_run() {
    let data = random_epochs(4, 3, 200, 17);
    let params = ConnectivityParams::from_json(
        r#"{
            "spectral_mode": "fft",
            "sfreq": 100.0,
            "fmin": [5.0, 20.0],
            "fmax": [15.0, 30.0],
            "faverage": true,
            "indices": { "seeds": [1, 2], "targets": [0, 0] },
            "n_jobs": 2
        }"#,
    )
    .unwrap();
    let out = spectral_connectivity(data.outer_iter(), &["pli".into()], &params).unwrap();
    assert_eq!(out.connectivity[0].shape(), &[2, 2]);
    let bands = out.freqs.as_bands().unwrap();
    assert_eq!(bands.len(), 2);
    assert!(bands[0].iter().all(|&f| (5.0..=15.0).contains(&f)));
    assert!(bands[1].iter().all(|&f| (20.0..=30.0).contains(&f)));

    let json = serde_json::to_value(&out.metadata[0]).unwrap();
    assert_eq!(json["spectral_mode"], "fft");
    assert_eq!(json["n_epochs"], 4);
}
