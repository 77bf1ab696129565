// enkf_core/src/estimation/filters/ensrf_direct.rs

use nalgebra::{DMatrix, DVector};
use rand::RngCore;

use crate::error::Result;
use crate::estimation::{AnalysisInput, AnalysisScheme, Prepared, Tolerances};
use crate::linalg::{hadamard, inverse, solve_vector, EnsembleSplit, SymmetricSpectrum};

/// Whitaker-Hamill ensemble square-root filter evaluated in direct form.
///
/// The Kalman gain is never formed. The mean goes through one linear solve
/// with `HPHᵀ + R`; the perturbation update uses the modified gain
/// `PHᵀ (√(HPHᵀ+R))⁻ᵀ (√(HPHᵀ+R) + √R)⁻¹` applied strictly right to left so
/// that no `Nx × Nx` or `Nx × Ny` intermediate is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsrfDirect {
    pub tolerances: Tolerances,
}

impl EnsrfDirect {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }
}

/// [`EnsrfDirect`] with `PHᵀ` and `HPHᵀ` tapered by Hadamard product
/// (Tierney et al. 2020). `PHᵀ` has to be formed explicitly here.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsrfDirectLocalized {
    pub tolerances: Tolerances,
}

impl EnsrfDirectLocalized {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }
}

/// The two Ny-sized right-hand factors shared by both forms: the mean
/// increment `(HPHᵀ+R)⁻¹ d` and the perturbation factor
/// `(√(HPHᵀ+R))⁻ᵀ (√(HPHᵀ+R) + √R)⁻¹ HXp`.
struct DirectFactors {
    mean_gain: DVector<f64>,
    perturbation_gain: DMatrix<f64>,
}

fn direct_factors(
    p: &Prepared,
    hpht: DMatrix<f64>,
    obs_variance: &DVector<f64>,
    tol: &Tolerances,
) -> Result<DirectFactors> {
    let a = hpht + DMatrix::from_diagonal(obs_variance);

    let mut spectrum = SymmetricSpectrum::new(&a);
    spectrum.ensure_invertible(tol, "HPHᵀ + R")?;
    spectrum.clamp_non_negative(tol, "HPHᵀ + R")?;
    let a_sqrt = spectrum.sqrt();

    let mean_gain = solve_vector(&a, &p.innovation, "HPHᵀ + R")?;

    // √A⁻¹ = √A · A⁻¹
    let a_sqrt_inv = &a_sqrt * inverse(&a, "HPHᵀ + R")?;
    let factor = inverse(
        &(a_sqrt + DMatrix::from_diagonal(&obs_variance.map(f64::sqrt))),
        "√(HPHᵀ + R) + √R",
    )?;
    let perturbation_gain = a_sqrt_inv.transpose() * (factor * &p.obs.perturbations);

    Ok(DirectFactors {
        mean_gain,
        perturbation_gain,
    })
}

impl AnalysisScheme for EnsrfDirect {
    fn name(&self) -> &'static str {
        "ensrf_direct"
    }

    fn update(&self, input: &AnalysisInput<'_>, _rng: &mut dyn RngCore) -> Result<DMatrix<f64>> {
        let p = input.prepare();
        let hxp = &p.obs.perturbations;
        let hpht = hxp * hxp.transpose() / p.dof();

        let factors = direct_factors(&p, hpht, input.obs_variance(), &self.tolerances)?;
        let hxp_t = hxp.transpose() / p.dof();

        let xfp = &p.state.perturbations;
        let mean = &p.state.mean + xfp * (&hxp_t * &factors.mean_gain);
        let correction = xfp * (&hxp_t * &factors.perturbation_gain);

        Ok(EnsembleSplit::recompose(&mean, xfp - correction))
    }
}

impl AnalysisScheme for EnsrfDirectLocalized {
    fn name(&self) -> &'static str {
        "ensrf_direct_localized"
    }

    fn requires_localization(&self) -> bool {
        true
    }

    fn update(&self, input: &AnalysisInput<'_>, _rng: &mut dyn RngCore) -> Result<DMatrix<f64>> {
        let loc = input.require_localization(self.name())?;
        let p = input.prepare();
        let hxp = &p.obs.perturbations;
        let xfp = &p.state.perturbations;

        let pht = hadamard(loc.ph_loc(), &(xfp * hxp.transpose() / p.dof()), "PH localization")?;
        let hpht = hadamard(loc.hph_loc(), &(hxp * hxp.transpose() / p.dof()), "HPH localization")?;

        let factors = direct_factors(&p, hpht, input.obs_variance(), &self.tolerances)?;

        let mean = &p.state.mean + &pht * &factors.mean_gain;
        let correction = &pht * &factors.perturbation_gain;

        Ok(EnsembleSplit::recompose(&mean, xfp - correction))
    }
}
