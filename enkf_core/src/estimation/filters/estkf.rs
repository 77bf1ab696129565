// enkf_core/src/estimation/filters/estkf.rs

use nalgebra::DMatrix;
use rand::RngCore;

use crate::error::Result;
use crate::estimation::{AnalysisInput, AnalysisScheme, Tolerances};
use crate::linalg::{add_to_columns, scale_rows, EnsembleSplit, SymmetricSpectrum};

/// Error-subspace transform Kalman filter (Nerger et al. 2012).
///
/// Works in the `Ne - 1` dimensional error subspace spanned by the columns of
/// [`projection_matrix`] instead of the full ensemble space.
#[derive(Debug, Clone, Copy, Default)]
pub struct Estkf {
    pub tolerances: Tolerances,
}

impl Estkf {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }
}

/// The `Ne × (Ne-1)` matrix `A` with orthonormal columns orthogonal to the
/// all-ones vector. Multiplying an ensemble by `A` removes its mean and
/// projects the deviations onto the error subspace.
pub fn projection_matrix(members: usize) -> DMatrix<f64> {
    let ne = members as f64;
    let off = -1.0 / (ne * (1.0 + 1.0 / ne.sqrt()));
    let last = -1.0 / ne.sqrt();
    DMatrix::from_fn(members, members.saturating_sub(1), |i, j| {
        if i == members - 1 {
            last
        } else if i == j {
            1.0 + off
        } else {
            off
        }
    })
}

impl AnalysisScheme for Estkf {
    fn name(&self) -> &'static str {
        "estkf"
    }

    fn update(&self, input: &AnalysisInput<'_>, _rng: &mut dyn RngCore) -> Result<DMatrix<f64>> {
        let p = input.prepare();
        let ne = p.members;
        let projection = projection_matrix(ne);
        let r_inv = input.obs_variance().map(|r| 1.0 / r);

        // HXp A equals HXf A since A annihilates the ensemble mean.
        let hl = &p.obs.perturbations * &projection;
        let b1 = scale_rows(&hl, &r_inv);
        let c2 = DMatrix::<f64>::identity(ne - 1, ne - 1) * p.dof() + hl.transpose() * &b1;

        // (Ne-1) I plus a PSD term: no eigenvalue lies below Ne-1.
        let mut spectrum = SymmetricSpectrum::new(&c2);
        spectrum.lift_to_floor(p.dof(), "error-subspace precision")?;

        let mean_weights = spectrum.inverse() * (b1.transpose() * &p.innovation);
        let perturbation_weights =
            spectrum.inverse_sqrt() * projection.transpose() * p.dof().sqrt();

        let weights = &projection * add_to_columns(perturbation_weights, &mean_weights);
        Ok(EnsembleSplit::recompose(
            &p.state.mean,
            &p.state.perturbations * weights,
        ))
    }
}
