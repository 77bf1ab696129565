// enkf_sim/src/simulation/twin.rs

//! The twin experiment: a known truth on a grid, a biased and perturbed prior
//! ensemble, noisy observations of the truth and one analysis step.

use enkf_core::prelude::*;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::{debug, info};

use crate::error::Result;
use crate::simulation::config::{EnsembleConfig, ScenarioConfig};
use crate::simulation::core::prng::SimulationRng;
use crate::simulation::grid::Grid;
use crate::simulation::network::ObservationNetwork;
use crate::simulation::report::{rmse, AnalysisReport};

/// Random Gaussian bumps summed into each member's perturbation field.
const BUMPS_PER_MEMBER: usize = 12;

/// All synthetic inputs of one scenario, built before any analysis runs.
#[derive(Debug, Clone)]
pub struct TwinExperiment {
    pub grid: Grid,
    pub truth: DVector<f64>,
    pub prior: DMatrix<f64>,
    pub network: ObservationNetwork,
    /// Tapers for the full candidate network, when a length scale is configured.
    pub localization: Option<LocalizationMatrices>,
}

impl TwinExperiment {
    pub fn generate(config: &ScenarioConfig, rng: &mut SimulationRng) -> Result<Self> {
        let distance = Haversine::default();
        let grid = Grid::new(&config.grid);
        let truth = grid.truth();
        let prior = perturbed_ensemble(&grid, &truth, &config.ensemble, &distance, rng);
        let network = ObservationNetwork::generate(&grid, &truth, &config.observations, &distance, rng);

        let localization = match config.localization.cov_len_km {
            Some(cov_len) => Some(LocalizationMatrices::build(
                grid.points(),
                &network.latitudes(),
                &network.longitudes(),
                cov_len,
                &distance,
            )?),
            None => None,
        };

        debug!(
            "twin experiment: {} grid points, {} members, {} candidate sites",
            grid.len(),
            prior.ncols(),
            network.len()
        );
        Ok(Self {
            grid,
            truth,
            prior,
            network,
            localization,
        })
    }
}

/// `truth + bias + Σ a·exp(-d²/2L²)` per member, with bump centres drawn
/// uniformly over the grid and amplitudes `a ~ N(0, perturbation_std²)`.
fn perturbed_ensemble<R, D>(
    grid: &Grid,
    truth: &DVector<f64>,
    config: &EnsembleConfig,
    distance: &D,
    rng: &mut R,
) -> DMatrix<f64>
where
    R: Rng + ?Sized,
    D: GeodesicDistance + ?Sized,
{
    let two_l2 = 2.0 * config.correlation_km * config.correlation_km;
    let mut ensemble = DMatrix::zeros(grid.len(), config.members);

    for mut member in ensemble.column_iter_mut() {
        member.copy_from(truth);
        member.add_scalar_mut(config.bias);
        for _ in 0..BUMPS_PER_MEMBER {
            let centre = grid.sample_location(&mut *rng);
            let z: f64 = StandardNormal.sample(&mut *rng);
            let amplitude = config.perturbation_std * z;
            for (value, point) in member.iter_mut().zip(grid.points()) {
                let d = distance.distance(point, &centre);
                *value += amplitude * (-d * d / two_l2).exp();
            }
        }
    }
    ensemble
}

/// The observation-space inputs of one analysis, restricted to the active
/// sites.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveObservations {
    pub predicted: DMatrix<f64>,
    pub observations: DVector<f64>,
    pub obs_variance: DVector<f64>,
    pub localization: Option<LocalizationMatrices>,
}

/// Slices `HXf`, `Y`, `R` and the localization tapers (columns of `PH_loc`,
/// rows and columns of `HPH_loc`) down to the sites listed in `active`.
///
/// The analysis schemes expect their inputs already restricted this way.
pub fn select_active(
    predicted: &DMatrix<f64>,
    observations: &DVector<f64>,
    obs_variance: &DVector<f64>,
    localization: Option<&LocalizationMatrices>,
    active: &[usize],
) -> Result<ActiveObservations> {
    let localization = match localization {
        Some(loc) => Some(LocalizationMatrices::new(
            loc.ph_loc().select_columns(active),
            loc.hph_loc().select_rows(active).select_columns(active),
        )?),
        None => None,
    };
    Ok(ActiveObservations {
        predicted: predicted.select_rows(active),
        observations: observations.select_rows(active),
        obs_variance: obs_variance.select_rows(active),
        localization,
    })
}

/// Builds the twin experiment for `config`, runs its analysis scheme once
/// and scores prior and posterior against the truth.
pub fn run_scenario(config: &ScenarioConfig) -> Result<AnalysisReport> {
    let seed = config.seed.unwrap_or_else(|| {
        let seed = u64::from(rand::random::<u32>());
        info!("'{}' has no seed, using {}", config.name, seed);
        seed
    });
    let mut rng = SimulationRng::from_seed(seed);

    let twin = TwinExperiment::generate(config, &mut rng)?;
    let active_sites = twin
        .network
        .draw_active(config.observations.active_fraction, &mut rng);
    let active = select_active(
        &twin.network.predicted(&twin.prior),
        &twin.network.observations,
        &twin.network.obs_variance,
        twin.localization.as_ref(),
        &active_sites,
    )?;

    let mut input = AnalysisInput::new(
        &twin.prior,
        &active.predicted,
        &active.observations,
        &active.obs_variance,
    )?;
    if let Some(loc) = active.localization.as_ref() {
        input = input.with_localization(loc)?;
    }

    let scheme = config.filter.build(config.tolerances);
    info!(
        "Running '{}' with {} ({} of {} sites active)",
        config.name,
        scheme.name(),
        active_sites.len(),
        twin.network.len()
    );
    let posterior = scheme.analyze(&input, &mut rng)?;

    let report = AnalysisReport {
        scenario: config.name.clone(),
        filter: config.filter,
        seed,
        state_dim: twin.grid.len(),
        candidate_observations: twin.network.len(),
        active_observations: active_sites.len(),
        members: twin.prior.ncols(),
        prior_rmse: rmse(&ensemble_mean(&twin.prior), &twin.truth),
        posterior_rmse: rmse(&ensemble_mean(&posterior), &twin.truth),
        prior_spread: ensemble_spread(&twin.prior),
        posterior_spread: ensemble_spread(&posterior),
    };
    info!(
        "'{}': rmse {:.4} -> {:.4}, spread {:.4} -> {:.4}",
        report.scenario,
        report.prior_rmse,
        report.posterior_rmse,
        report.prior_spread,
        report.posterior_spread
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::{GridConfig, LocalizationConfig, ObservationConfig};
    use approx::assert_abs_diff_eq;

    fn compact(filter: FilterKind) -> ScenarioConfig {
        ScenarioConfig {
            name: "compact".to_string(),
            seed: Some(2024),
            filter,
            grid: GridConfig {
                lat_min: 40.0,
                lat_max: 55.0,
                lat_count: 6,
                lon_min: -10.0,
                lon_max: 10.0,
                lon_count: 8,
            },
            ensemble: EnsembleConfig {
                members: 40,
                perturbation_std: 1.0,
                correlation_km: 600.0,
                bias: 1.0,
            },
            observations: ObservationConfig {
                count: 30,
                error_variance: 0.05,
                active_fraction: 1.0,
            },
            localization: LocalizationConfig {
                cov_len_km: Some(1500.0),
            },
            ..ScenarioConfig::default()
        }
    }

    #[test]
    fn test_analysis_improves_on_the_prior() {
        for kind in FilterKind::ALL {
            let report = run_scenario(&compact(kind)).unwrap();
            assert_eq!(report.state_dim, 48);
            assert_eq!(report.active_observations, 30);
            assert_eq!(report.members, 40);
            assert!(
                report.posterior_rmse <= report.prior_rmse,
                "{}: {} > {}",
                kind,
                report.posterior_rmse,
                report.prior_rmse
            );
            assert!(report.posterior_spread < report.prior_spread, "{}", kind);
        }
    }

    #[test]
    fn test_same_seed_same_report() {
        let config = compact(FilterKind::Senkf);
        assert_eq!(run_scenario(&config).unwrap(), run_scenario(&config).unwrap());
    }

    #[test]
    fn test_no_active_sites_leaves_the_prior() {
        let mut config = compact(FilterKind::Etkf);
        config.observations.active_fraction = 0.0;
        let report = run_scenario(&config).unwrap();

        assert_eq!(report.active_observations, 0);
        assert_abs_diff_eq!(report.posterior_rmse, report.prior_rmse, epsilon = 1e-12);
        assert_abs_diff_eq!(report.posterior_spread, report.prior_spread, epsilon = 1e-12);
    }

    #[test]
    fn test_prior_is_biased_and_spread() {
        let config = compact(FilterKind::Etkf);
        let mut rng = SimulationRng::from_seed(5);
        let twin = TwinExperiment::generate(&config, &mut rng).unwrap();

        assert_eq!(twin.prior.shape(), (48, 40));
        assert!(ensemble_spread(&twin.prior) > 0.1);
        let mean_error = (ensemble_mean(&twin.prior) - &twin.truth).mean();
        assert!(mean_error > 0.5, "bias {}", mean_error);

        let loc = twin.localization.unwrap();
        assert_eq!(loc.ph_loc().shape(), (48, 30));
        assert_eq!(loc.hph_loc().shape(), (30, 30));
    }

    #[test]
    fn test_select_active_slices_consistently() {
        let predicted = DMatrix::from_fn(4, 3, |i, j| (10 * i + j) as f64);
        let observations = DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let obs_variance = DVector::from_vec(vec![0.1, 0.2, 0.3, 0.4]);
        let loc = LocalizationMatrices::new(
            DMatrix::from_fn(2, 4, |i, j| (i + j) as f64 / 10.0),
            DMatrix::from_fn(4, 4, |i, j| if i == j { 1.0 } else { (i * j) as f64 / 20.0 }),
        )
        .unwrap();

        let active =
            select_active(&predicted, &observations, &obs_variance, Some(&loc), &[1, 3]).unwrap();

        assert_eq!(active.predicted.row(0), predicted.row(1));
        assert_eq!(active.predicted.row(1), predicted.row(3));
        assert_eq!(active.observations, DVector::from_vec(vec![1.0, 3.0]));
        assert_eq!(active.obs_variance, DVector::from_vec(vec![0.2, 0.4]));

        let sliced = active.localization.unwrap();
        assert_eq!(sliced.ph_loc().column(1), loc.ph_loc().column(3));
        assert_eq!(
            *sliced.hph_loc(),
            DMatrix::from_row_slice(2, 2, &[1.0, 0.15, 0.15, 1.0])
        );
    }
}
