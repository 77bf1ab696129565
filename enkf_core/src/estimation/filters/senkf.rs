// enkf_core/src/estimation/filters/senkf.rs

use nalgebra::DMatrix;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

use crate::error::Result;
use crate::estimation::{AnalysisInput, AnalysisScheme, Tolerances};
use crate::linalg::{hadamard, solve};

/// Stochastic ensemble Kalman filter (perturbed observations).
///
/// Every member is pulled towards its own perturbed copy of the
/// observations, `Y + ε` with `ε ~ N(0, R)`. The posterior therefore only
/// matches the Kalman update in expectation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StochasticEnkf {
    pub tolerances: Tolerances,
}

impl StochasticEnkf {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }
}

/// [`StochasticEnkf`] with the cross and observation covariances tapered by
/// `PH_loc` and `HPH_loc` before they enter any other linear algebra.
#[derive(Debug, Clone, Copy, Default)]
pub struct StochasticEnkfLocalized {
    pub tolerances: Tolerances,
}

impl StochasticEnkfLocalized {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }
}

/// `D = Y + ε - HXf`, one column per member. Always draws exactly `Ny × Ne`
/// standard normals, column by column.
fn perturbed_innovations(input: &AnalysisInput<'_>, rng: &mut dyn RngCore) -> DMatrix<f64> {
    let y = input.observations();
    let hxf = input.predicted();
    let std_dev = input.obs_variance().map(f64::sqrt);

    DMatrix::from_fn(input.obs_dim(), input.members(), |i, j| {
        let z: f64 = StandardNormal.sample(&mut *rng);
        y[i] + std_dev[i] * z - hxf[(i, j)]
    })
}

impl AnalysisScheme for StochasticEnkf {
    fn name(&self) -> &'static str {
        "senkf"
    }

    fn is_stochastic(&self) -> bool {
        true
    }

    fn update(&self, input: &AnalysisInput<'_>, rng: &mut dyn RngCore) -> Result<DMatrix<f64>> {
        let p = input.prepare();
        let hxp = &p.obs.perturbations;

        let hpht = hxp * hxp.transpose() / p.dof();
        let a = hpht + DMatrix::from_diagonal(input.obs_variance());

        let d = perturbed_innovations(input, rng);
        let c = solve(&a, &d, "HPHᵀ + R")?;

        // Ne × Ne weights first, the Nx × Ne product last.
        let weights = hxp.transpose() * c / p.dof();
        Ok(input.prior() + &p.state.perturbations * weights)
    }
}

impl AnalysisScheme for StochasticEnkfLocalized {
    fn name(&self) -> &'static str {
        "senkf_localized"
    }

    fn requires_localization(&self) -> bool {
        true
    }

    fn is_stochastic(&self) -> bool {
        true
    }

    fn update(&self, input: &AnalysisInput<'_>, rng: &mut dyn RngCore) -> Result<DMatrix<f64>> {
        let loc = input.require_localization(self.name())?;
        let p = input.prepare();
        let hxp = &p.obs.perturbations;

        let hpht = hadamard(loc.hph_loc(), &(hxp * hxp.transpose() / p.dof()), "HPH localization")?;
        let a = hpht + DMatrix::from_diagonal(input.obs_variance());

        let d = perturbed_innovations(input, rng);
        let c = solve(&a, &d, "localized HPHᵀ + R")?;

        let pht = hadamard(
            loc.ph_loc(),
            &(&p.state.perturbations * hxp.transpose() / p.dof()),
            "PH localization",
        )?;
        Ok(input.prior() + pht * c)
    }
}
