// enkf_core/src/linalg/spectral.rs

use nalgebra::{DMatrix, DVector, SymmetricEigen, SVD};
use tracing::{debug, warn};

use super::Tolerances;
use crate::error::{AnalysisError, Result};

/// Eigendecomposition `M = V diag(λ) Vᵀ` of a symmetric matrix with the
/// eigenvalues sorted ascending.
#[derive(Debug, Clone)]
pub struct SymmetricSpectrum {
    pub values: DVector<f64>,
    pub vectors: DMatrix<f64>,
}

impl SymmetricSpectrum {
    pub fn new(m: &DMatrix<f64>) -> Self {
        // Products like `A Aᵀ` are symmetric only up to round-off.
        let sym = (m + m.transpose()) * 0.5;
        let eigen = SymmetricEigen::new(sym);

        let n = eigen.eigenvalues.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

        let values = DVector::from_iterator(n, order.iter().map(|&i| eigen.eigenvalues[i]));
        let vectors = eigen.eigenvectors.select_columns(&order);
        Self { values, vectors }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Largest eigenvalue magnitude, zero for an empty or null matrix.
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
    }

    /// Rounds eigenvalues that are zero up to round-off to exactly zero.
    ///
    /// Negative eigenvalues within `eigen_floor` of zero are clamped silently.
    /// Larger negative ones are clamped with a warning as long as the
    /// imaginary part they would put into a square root stays below
    /// `tol.imaginary`; otherwise this fails with `ComplexSquareRoot`.
    pub fn clamp_non_negative(&mut self, tol: &Tolerances, what: &'static str) -> Result<()> {
        let scale = self.max_abs();
        if scale == 0.0 {
            return Ok(());
        }
        let floor = tol.eigen_floor * scale;
        for value in self.values.iter_mut() {
            if *value >= floor {
                continue;
            }
            if *value < -floor {
                let imaginary = (-*value / scale).sqrt();
                if imaginary > tol.imaginary {
                    return Err(AnalysisError::ComplexSquareRoot {
                        what,
                        imaginary,
                        tolerance: tol.imaginary,
                    });
                }
                warn!(
                    "{}: clamping negative eigenvalue {:.3e} (relative imaginary part {:.3e})",
                    what, *value, imaginary
                );
            }
            *value = 0.0;
        }
        Ok(())
    }

    /// Fails with `SingularMatrix` unless every eigenvalue is safely positive.
    pub fn ensure_invertible(&self, tol: &Tolerances, what: &'static str) -> Result<()> {
        if self.dim() == 0 {
            return Ok(());
        }
        let min = self.values[0];
        let max = self.max_abs();
        if !(min > tol.singular * max) {
            debug!("{}: eigenvalue range [{:.3e}, {:.3e}] is singular", what, min, max);
            return Err(AnalysisError::SingularMatrix(what));
        }
        Ok(())
    }

    /// For matrices of the form `c I + (PSD)`, whose eigenvalues can never fall
    /// below `c`. Round-off under the floor is lifted back onto it with a
    /// warning; only non-finite spectra are an error.
    pub fn lift_to_floor(&mut self, floor: f64, what: &'static str) -> Result<()> {
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::SingularMatrix(what));
        }
        for value in self.values.iter_mut() {
            if *value < floor {
                if floor - *value > 1e-8 * floor {
                    warn!(
                        "{}: eigenvalue {:.6e} below its analytic floor {:.6e}, lifting",
                        what, *value, floor
                    );
                }
                *value = floor;
            }
        }
        Ok(())
    }

    /// `V diag(f(λ)) Vᵀ`.
    pub fn compose(&self, f: impl Fn(f64) -> f64) -> DMatrix<f64> {
        let mut scaled = self.vectors.clone();
        for (mut column, value) in scaled.column_iter_mut().zip(self.values.iter()) {
            column *= f(*value);
        }
        scaled * self.vectors.transpose()
    }

    pub fn inverse(&self) -> DMatrix<f64> {
        self.compose(|l| 1.0 / l)
    }

    pub fn sqrt(&self) -> DMatrix<f64> {
        self.compose(f64::sqrt)
    }

    pub fn inverse_sqrt(&self) -> DMatrix<f64> {
        self.compose(|l| 1.0 / l.sqrt())
    }
}

/// Principal square root `S` (with `S·S = M`) of a symmetric positive
/// semi-definite matrix. Round-off negatives are clamped first.
pub fn sqrtm_psd(m: &DMatrix<f64>, tol: &Tolerances, what: &'static str) -> Result<DMatrix<f64>> {
    let mut spectrum = SymmetricSpectrum::new(m);
    spectrum.clamp_non_negative(tol, what)?;
    Ok(spectrum.sqrt())
}

/// Thin singular value decomposition `M = U diag(s) Vᵗ` with the singular
/// values sorted descending. For an `m × n` matrix with `k = min(m, n)`,
/// `U` is `m × k` and `Vᵗ` is `k × n`.
#[derive(Debug, Clone)]
pub struct ThinSvd {
    pub u: DMatrix<f64>,
    pub singular_values: DVector<f64>,
    pub v_t: DMatrix<f64>,
}

impl ThinSvd {
    /// The symmetric `m × m` matrix `U f(Σ) Uᵀ` taken over a complete
    /// orthonormal basis, where the columns missing from the thin `U` carry
    /// singular value zero. Evaluated as `f(0) I + U diag(f(s) - f(0)) Uᵀ`.
    pub fn left_function(&self, f: impl Fn(f64) -> f64) -> DMatrix<f64> {
        let m = self.u.nrows();
        let at_zero = f(0.0);
        let mut scaled = self.u.clone();
        for (mut column, s) in scaled.column_iter_mut().zip(self.singular_values.iter()) {
            column *= f(*s) - at_zero;
        }
        DMatrix::identity(m, m) * at_zero + scaled * self.u.transpose()
    }
}

pub fn svd(m: &DMatrix<f64>) -> Result<ThinSvd> {
    let decomposition = SVD::new(m.clone(), true, true);
    let u = decomposition
        .u
        .ok_or(AnalysisError::DecompositionFailed("left singular vectors"))?;
    let v_t = decomposition
        .v_t
        .ok_or(AnalysisError::DecompositionFailed("right singular vectors"))?;
    let s = decomposition.singular_values;

    let mut order: Vec<usize> = (0..s.len()).collect();
    order.sort_by(|&a, &b| s[b].total_cmp(&s[a]));

    Ok(ThinSvd {
        u: u.select_columns(&order),
        singular_values: DVector::from_iterator(s.len(), order.iter().map(|&i| s[i])),
        v_t: v_t.select_rows(&order),
    })
}
