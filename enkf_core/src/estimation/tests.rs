// enkf_core/src/estimation/tests.rs

//! Behaviour shared by every analysis scheme, checked against a direct
//! evaluation of the Kalman update on small ensembles.

use approx::assert_abs_diff_eq;
use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use super::*;
use crate::linalg::{ensemble_mean, EnsembleSplit};
use crate::localization::distance::Haversine;
use crate::types::GeoPoint;

const EPSILON: f64 = 1e-8;

/// Observed state rows; `HXf` is `Xf` restricted to these rows.
const OBSERVED_ROWS: [usize; 4] = [0, 2, 3, 5];

struct Fixture {
    prior: DMatrix<f64>,
    predicted: DMatrix<f64>,
    observations: DVector<f64>,
    obs_variance: DVector<f64>,
}

impl Fixture {
    fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let prior = DMatrix::from_fn(6, 8, |i, _| {
            let z: f64 = StandardNormal.sample(&mut rng);
            i as f64 + z
        });
        let predicted = prior.select_rows(&OBSERVED_ROWS);
        let observations = DVector::from_fn(OBSERVED_ROWS.len(), |i, _| {
            let z: f64 = StandardNormal.sample(&mut rng);
            OBSERVED_ROWS[i] as f64 + 0.5 + z
        });
        let obs_variance = DVector::from_vec(vec![0.5, 1.0, 0.8, 1.5]);
        Self {
            prior,
            predicted,
            observations,
            obs_variance,
        }
    }

    fn input(&self) -> AnalysisInput<'_> {
        AnalysisInput::new(
            &self.prior,
            &self.predicted,
            &self.observations,
            &self.obs_variance,
        )
        .unwrap()
    }

    /// Posterior mean and covariance of the exact Kalman update using the
    /// sample covariances of the prior ensemble.
    fn kalman_reference(&self) -> (DVector<f64>, DMatrix<f64>) {
        let x = EnsembleSplit::new(&self.prior);
        let hx = EnsembleSplit::new(&self.predicted);
        let dof = (self.prior.ncols() - 1) as f64;

        let p = &x.perturbations * x.perturbations.transpose() / dof;
        let pht = &x.perturbations * hx.perturbations.transpose() / dof;
        let hpht = &hx.perturbations * hx.perturbations.transpose() / dof;
        let a = hpht + DMatrix::from_diagonal(&self.obs_variance);
        let gain = &pht * a.try_inverse().unwrap();

        let mean = &x.mean + &gain * (&self.observations - &hx.mean);
        let covariance = &p - &gain * pht.transpose();
        (mean, covariance)
    }
}

fn sample_covariance(ensemble: &DMatrix<f64>) -> DMatrix<f64> {
    let split = EnsembleSplit::new(ensemble);
    &split.perturbations * split.perturbations.transpose() / (ensemble.ncols() - 1) as f64
}

fn run(kind: FilterKind, input: &AnalysisInput<'_>, seed: u64) -> DMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    kind.build(Tolerances::default())
        .analyze(input, &mut rng)
        .unwrap()
}

fn deterministic_kinds() -> impl Iterator<Item = FilterKind> {
    FilterKind::ALL.into_iter().filter(|kind| !kind.is_stochastic())
}

#[test]
fn test_every_scheme_keeps_the_ensemble_shape() {
    let fixture = Fixture::new(1);
    let unit = LocalizationMatrices::unit(6, 4);
    let input = fixture.input().with_localization(&unit).unwrap();

    for kind in FilterKind::ALL {
        let posterior = run(kind, &input, 7);
        assert_eq!(posterior.shape(), (6, 8), "{}", kind);
        assert!(posterior.iter().all(|v| v.is_finite()), "{}", kind);
    }
}

#[test]
fn test_deterministic_schemes_match_the_kalman_moments() {
    let fixture = Fixture::new(2);
    let unit = LocalizationMatrices::unit(6, 4);
    let input = fixture.input().with_localization(&unit).unwrap();
    let (mean, covariance) = fixture.kalman_reference();

    for kind in deterministic_kinds() {
        let posterior = run(kind, &input, 0);
        assert!(
            (ensemble_mean(&posterior) - &mean).amax() < EPSILON,
            "posterior mean of {} differs from the Kalman mean",
            kind
        );
        assert!(
            (sample_covariance(&posterior) - &covariance).amax() < EPSILON,
            "posterior covariance of {} differs from the Kalman covariance",
            kind
        );
    }
}

#[test]
fn test_symmetric_transforms_give_identical_ensembles() {
    let fixture = Fixture::new(3);
    let input = fixture.input();
    let reference = run(FilterKind::Etkf, &input, 0);

    for kind in [FilterKind::EtkfLivings, FilterKind::Ensrf, FilterKind::Estkf] {
        let posterior = run(kind, &input, 0);
        assert_abs_diff_eq!(posterior, reference, epsilon = EPSILON);
    }
}

#[test]
fn test_scalar_update() {
    let prior = DMatrix::from_row_slice(1, 5, &[1.0, 2.0, 3.0, 4.0, 5.0]);
    let observations = DVector::from_element(1, 5.0);
    let obs_variance = DVector::from_element(1, 1.5);
    let unit = LocalizationMatrices::unit(1, 1);
    let input = AnalysisInput::new(&prior, &prior, &observations, &obs_variance)
        .unwrap()
        .with_localization(&unit)
        .unwrap();

    for kind in deterministic_kinds() {
        let posterior = run(kind, &input, 0);
        // Prior mean 3 and variance 2.5, so the gain is 2.5 / 4.
        assert_abs_diff_eq!(ensemble_mean(&posterior)[0], 4.25, epsilon = 1e-10);
        assert_abs_diff_eq!(sample_covariance(&posterior)[(0, 0)], 0.9375, epsilon = 1e-10);
    }
}

#[test]
fn test_stochastic_mean_is_unbiased() {
    let prior = DMatrix::from_row_slice(1, 5, &[1.0, 2.0, 3.0, 4.0, 5.0]);
    let observations = DVector::from_element(1, 5.0);
    let obs_variance = DVector::from_element(1, 1.5);
    let input = AnalysisInput::new(&prior, &prior, &observations, &obs_variance).unwrap();
    let scheme = FilterKind::Senkf.build(Tolerances::default());

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let trials = 4000;
    let mut total = 0.0;
    for _ in 0..trials {
        let posterior = scheme.analyze(&input, &mut rng).unwrap();
        total += ensemble_mean(&posterior)[0];
    }
    assert_abs_diff_eq!(total / trials as f64, 4.25, epsilon = 0.03);
}

#[test]
fn test_unit_localization_reproduces_the_global_update() {
    let fixture = Fixture::new(4);
    let unit = LocalizationMatrices::unit(6, 4);
    let global = fixture.input();
    let localized = fixture.input().with_localization(&unit).unwrap();

    assert_abs_diff_eq!(
        run(FilterKind::EnsrfDirectLocalized, &localized, 0),
        run(FilterKind::EnsrfDirect, &global, 0),
        epsilon = 1e-10
    );
    assert_abs_diff_eq!(
        run(FilterKind::SenkfLocalized, &localized, 21),
        run(FilterKind::Senkf, &global, 21),
        epsilon = 1e-10
    );
}

#[test]
fn test_repeated_calls_are_reproducible() {
    let fixture = Fixture::new(5);
    let unit = LocalizationMatrices::unit(6, 4);
    let input = fixture.input().with_localization(&unit).unwrap();

    for kind in deterministic_kinds() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let scheme = kind.build(Tolerances::default());
        let first = scheme.analyze(&input, &mut rng).unwrap();
        let second = scheme.analyze(&input, &mut rng).unwrap();
        assert_eq!(first, second, "{}", kind);
    }

    assert_eq!(run(FilterKind::Senkf, &input, 3), run(FilterKind::Senkf, &input, 3));
    assert_ne!(run(FilterKind::Senkf, &input, 3), run(FilterKind::Senkf, &input, 4));
}

#[test]
fn test_state_beyond_the_taper_is_left_untouched() {
    // Two observations at the same site near the origin, one grid point far
    // outside the taper support.
    let grid = [
        GeoPoint::new(0.0, 0.0),
        GeoPoint::new(0.0, 1.0),
        GeoPoint::new(60.0, 100.0),
    ];
    let loc = LocalizationMatrices::build(&grid, &[0.0, 0.0], &[0.0, 0.0], 500.0, &Haversine::default())
        .unwrap();
    assert!(loc.ph_loc().row(2).iter().all(|w| *w == 0.0));
    assert_abs_diff_eq!(loc.hph_loc().clone(), DMatrix::from_element(2, 2, 1.0), epsilon = 1e-12);

    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let prior = DMatrix::from_fn(3, 10, |_, _| {
        let z: f64 = StandardNormal.sample(&mut rng);
        z
    });
    let predicted = prior.select_rows(&[0, 0]);
    let observations = DVector::from_vec(vec![1.0, 1.2]);
    let obs_variance = DVector::from_vec(vec![0.5, 0.5]);
    let input = AnalysisInput::new(&prior, &predicted, &observations, &obs_variance)
        .unwrap()
        .with_localization(&loc)
        .unwrap();

    for kind in [FilterKind::EnsrfDirectLocalized, FilterKind::SenkfLocalized] {
        let posterior = run(kind, &input, 2);
        assert_abs_diff_eq!(
            posterior.row(2).into_owned(),
            prior.row(2).into_owned(),
            epsilon = 1e-12
        );
        assert_ne!(posterior.row(0), prior.row(0), "{}", kind);
    }
}

#[test]
fn test_no_observations_returns_the_prior() {
    let fixture = Fixture::new(6);
    let predicted = DMatrix::<f64>::zeros(0, 8);
    let empty = DVector::<f64>::zeros(0);
    let unit = LocalizationMatrices::unit(6, 0);
    let input = AnalysisInput::new(&fixture.prior, &predicted, &empty, &empty)
        .unwrap()
        .with_localization(&unit)
        .unwrap();

    for kind in FilterKind::ALL {
        assert_eq!(run(kind, &input, 0), fixture.prior, "{}", kind);
    }
}

#[test]
fn test_invalid_inputs_are_rejected() {
    let fixture = Fixture::new(7);

    let short = DVector::from_vec(vec![1.0, 2.0]);
    assert_eq!(
        AnalysisInput::new(&fixture.prior, &fixture.predicted, &short, &fixture.obs_variance)
            .unwrap_err(),
        AnalysisError::DimensionMismatch {
            what: "observation vector",
            expected: 4,
            found: 2,
        }
    );

    let bad_variance = DVector::from_vec(vec![0.5, 0.0, 0.8, 1.5]);
    assert!(matches!(
        AnalysisInput::new(&fixture.prior, &fixture.predicted, &fixture.observations, &bad_variance),
        Err(AnalysisError::InvalidParameter { .. })
    ));

    let wrong_members = fixture.predicted.columns(0, 7).into_owned();
    assert!(matches!(
        AnalysisInput::new(&fixture.prior, &wrong_members, &fixture.observations, &fixture.obs_variance),
        Err(AnalysisError::DimensionMismatch { .. })
    ));

    let single = fixture.prior.columns(0, 1).into_owned();
    let single_hx = fixture.predicted.columns(0, 1).into_owned();
    assert_eq!(
        AnalysisInput::new(&single, &single_hx, &fixture.observations, &fixture.obs_variance)
            .unwrap_err(),
        AnalysisError::TooFewMembers(1)
    );

    let wrong_loc = LocalizationMatrices::unit(5, 4);
    assert!(matches!(
        fixture.input().with_localization(&wrong_loc),
        Err(AnalysisError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_localized_schemes_need_localization() {
    let fixture = Fixture::new(8);
    let input = fixture.input();
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    for kind in FilterKind::ALL.into_iter().filter(|k| k.is_localized()) {
        let scheme = kind.build(Tolerances::default());
        assert!(scheme.requires_localization());
        assert_eq!(
            scheme.analyze(&input, &mut rng).unwrap_err(),
            AnalysisError::MissingLocalization(kind.as_str())
        );
    }
}

#[test]
fn test_filter_kind_names() {
    for kind in FilterKind::ALL {
        assert_eq!(kind.to_string().parse::<FilterKind>().unwrap(), kind);
        assert_eq!(kind.build(Tolerances::default()).name(), kind.as_str());
        assert_eq!(kind.build(Tolerances::default()).is_stochastic(), kind.is_stochastic());
    }
    assert_eq!(" ETKF-Livings ".parse::<FilterKind>().unwrap(), FilterKind::EtkfLivings);
    assert_eq!(
        "kalman".parse::<FilterKind>().unwrap_err(),
        AnalysisError::UnknownFilter("kalman".to_string())
    );
}

#[test]
fn test_boxed_schemes_clone() {
    let schemes: Vec<Box<dyn AnalysisScheme>> = FilterKind::ALL
        .iter()
        .map(|kind| kind.build(Tolerances::default()))
        .collect();
    let cloned = schemes.clone();
    for (a, b) in schemes.iter().zip(cloned.iter()) {
        assert_eq!(a.name(), b.name());
    }
}

#[test]
fn test_precise_observation_is_handled_by_every_scheme() {
    let prior = DMatrix::from_row_slice(1, 5, &[1.0, 2.0, 3.0, 4.0, 5.0]);
    let observations = DVector::from_element(1, 5.0);
    let unit = LocalizationMatrices::unit(1, 1);

    for r in [1e-13, 1e-15] {
        let obs_variance = DVector::from_element(1, r);
        let input = AnalysisInput::new(&prior, &prior, &observations, &obs_variance)
            .unwrap()
            .with_localization(&unit)
            .unwrap();

        for kind in deterministic_kinds() {
            let mut rng = ChaCha8Rng::seed_from_u64(0);
            let posterior = kind
                .build(Tolerances::default())
                .analyze(&input, &mut rng)
                .unwrap_or_else(|e| panic!("{} failed at r = {:e}: {}", kind, r, e));
            // The posterior collapses onto the observation.
            assert_abs_diff_eq!(ensemble_mean(&posterior)[0], 5.0, epsilon = 1e-9);
            assert!(sample_covariance(&posterior)[(0, 0)] < 1e-9, "{}", kind);
        }
    }
}

#[test]
fn test_non_finite_inputs_are_rejected() {
    let fixture = Fixture::new(9);

    let mut observations = fixture.observations.clone();
    observations[2] = f64::NAN;
    assert!(matches!(
        AnalysisInput::new(&fixture.prior, &fixture.predicted, &observations, &fixture.obs_variance),
        Err(AnalysisError::InvalidParameter { name: "observation", .. })
    ));

    let mut predicted = fixture.predicted.clone();
    predicted[(1, 3)] = f64::INFINITY;
    assert!(matches!(
        AnalysisInput::new(&fixture.prior, &predicted, &fixture.observations, &fixture.obs_variance),
        Err(AnalysisError::InvalidParameter { name: "predicted observation", .. })
    ));

    let mut prior = fixture.prior.clone();
    prior[(0, 0)] = f64::NEG_INFINITY;
    assert!(matches!(
        AnalysisInput::new(&prior, &fixture.predicted, &fixture.observations, &fixture.obs_variance),
        Err(AnalysisError::InvalidParameter { name: "prior ensemble member", .. })
    ));
}
