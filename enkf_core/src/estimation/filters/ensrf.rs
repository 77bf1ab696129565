// enkf_core/src/estimation/filters/ensrf.rs

use nalgebra::DMatrix;
use rand::RngCore;
use tracing::warn;

use crate::error::{AnalysisError, Result};
use crate::estimation::{AnalysisInput, AnalysisScheme, Tolerances};
use crate::linalg::{add_to_columns, svd, EnsembleSplit, SymmetricSpectrum, ThinSvd};

/// Ensemble square-root filter through an eigendecomposition of the
/// observation-space Gram matrix followed by an SVD (Vetra-Carvalho et al.
/// 2018, algorithm 9, with the square root applied to the eigenvalues).
#[derive(Debug, Clone, Copy, Default)]
pub struct Ensrf {
    pub tolerances: Tolerances,
}

impl Ensrf {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }
}

impl AnalysisScheme for Ensrf {
    fn name(&self) -> &'static str {
        "ensrf"
    }

    fn update(&self, input: &AnalysisInput<'_>, _rng: &mut dyn RngCore) -> Result<DMatrix<f64>> {
        let tol = &self.tolerances;
        let p = input.prepare();
        let hxp = &p.obs.perturbations;

        // HXp HXpᵀ + (Ne - 1) R
        let gram = hxp * hxp.transpose() + DMatrix::from_diagonal(&(input.obs_variance() * p.dof()));
        let spectrum = SymmetricSpectrum::new(&gram);
        spectrum.ensure_invertible(tol, "observation gram matrix")?;

        // Whitening factor V Λ^(-1/2); the order of the product matters.
        let mut whitening = spectrum.vectors.clone();
        for (mut column, value) in whitening.column_iter_mut().zip(spectrum.values.iter()) {
            column /= value.sqrt();
        }
        let decomposition = svd(&(hxp.transpose() * whitening))?;

        let transform = square_root_transform(&decomposition, tol)?;

        // Mean weights HXpᵀ V Λ⁻¹ Vᵀ d.
        let projected = spectrum.vectors.transpose() * &p.innovation;
        let scaled = projected.component_div(&spectrum.values);
        let mean_weights = hxp.transpose() * (&spectrum.vectors * scaled);

        let weights = add_to_columns(transform, &mean_weights);
        Ok(EnsembleSplit::recompose(
            &p.state.mean,
            &p.state.perturbations * weights,
        ))
    }
}

/// `U √(I - Σ²) Uᵀ` over the full ensemble space.
///
/// Mathematically every `s < 1`. Anything at or above 1 is round-off, and the
/// root of a negative radicand is only kept if its imaginary part is tiny.
fn square_root_transform(decomposition: &ThinSvd, tol: &Tolerances) -> Result<DMatrix<f64>> {
    for s in decomposition.singular_values.iter() {
        let radicand = 1.0 - s * s;
        if radicand < 0.0 {
            let imaginary = (-radicand).sqrt();
            if imaginary > tol.imaginary {
                return Err(AnalysisError::ComplexSquareRoot {
                    what: "I - s² in the square-root transform",
                    imaginary,
                    tolerance: tol.imaginary,
                });
            }
            warn!("ensrf: singular value {:.15} >= 1, discarding imaginary part {:.3e}", s, imaginary);
        }
    }
    Ok(decomposition.left_function(|s| (1.0 - s * s).max(0.0).sqrt()))
}
