// enkf_core/src/linalg/mod.rs

//! Dense-matrix kernels shared by every analysis scheme.
//!
//! All functions are reentrant: they allocate their own outputs and never
//! touch shared scratch storage, so concurrent analysis calls are safe.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

pub mod spectral;

pub use spectral::{svd, sqrtm_psd, SymmetricSpectrum, ThinSvd};

/// Thresholds that govern how near-singular covariance-derived matrices are
/// treated before a square root or an inverse is taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Eigenvalues below `eigen_floor * max|λ|` are rounded to zero before a
    /// square root is taken.
    pub eigen_floor: f64,
    /// Largest relative imaginary part `sqrt(|λ_neg| / max|λ|)` that may be
    /// discarded when a negative eigenvalue is clamped.
    pub imaginary: f64,
    /// Smallest acceptable ratio `λ_min / λ_max` for a matrix that gets inverted.
    pub singular: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            eigen_floor: 1e-12,
            imaginary: 1e-6,
            singular: 1e-13,
        }
    }
}

/// An ensemble split into its mean and the perturbations around it.
#[derive(Debug, Clone)]
pub struct EnsembleSplit {
    /// Per-row mean (length `N`).
    pub mean: DVector<f64>,
    /// `ensemble - mean` broadcast over the columns (`N × Ne`).
    pub perturbations: DMatrix<f64>,
}

impl EnsembleSplit {
    pub fn new(ensemble: &DMatrix<f64>) -> Self {
        let mean = ensemble_mean(ensemble);
        let mut perturbations = ensemble.clone();
        for mut column in perturbations.column_iter_mut() {
            column -= &mean;
        }
        Self {
            mean,
            perturbations,
        }
    }

    /// Rebuilds a full ensemble from a mean and a set of perturbations.
    pub fn recompose(mean: &DVector<f64>, perturbations: DMatrix<f64>) -> DMatrix<f64> {
        add_to_columns(perturbations, mean)
    }
}

/// Adds `v` to every column of `m`.
pub fn add_to_columns(mut m: DMatrix<f64>, v: &DVector<f64>) -> DMatrix<f64> {
    for mut column in m.column_iter_mut() {
        column += v;
    }
    m
}

/// Mean over the ensemble axis (the columns).
pub fn ensemble_mean(ensemble: &DMatrix<f64>) -> DVector<f64> {
    ensemble.column_mean()
}

/// Average over all rows of the per-row sample standard deviation.
pub fn ensemble_spread(ensemble: &DMatrix<f64>) -> f64 {
    let (rows, members) = ensemble.shape();
    if rows == 0 || members < 2 {
        return 0.0;
    }
    let split = EnsembleSplit::new(ensemble);
    let total: f64 = split
        .perturbations
        .row_iter()
        .map(|row| (row.norm_squared() / (members - 1) as f64).sqrt())
        .sum();
    total / rows as f64
}

/// Fails with `DimensionMismatch` unless `m` is exactly `rows × cols`.
pub fn ensure_shape(m: &DMatrix<f64>, rows: usize, cols: usize, what: &'static str) -> Result<()> {
    if m.nrows() != rows {
        return Err(AnalysisError::DimensionMismatch {
            what,
            expected: rows,
            found: m.nrows(),
        });
    }
    if m.ncols() != cols {
        return Err(AnalysisError::DimensionMismatch {
            what,
            expected: cols,
            found: m.ncols(),
        });
    }
    Ok(())
}

/// Element-wise (Hadamard) product `weights ∘ m`. Shapes must match exactly.
pub fn hadamard(weights: &DMatrix<f64>, m: &DMatrix<f64>, what: &'static str) -> Result<DMatrix<f64>> {
    ensure_shape(weights, m.nrows(), m.ncols(), what)?;
    Ok(weights.component_mul(m))
}

/// Multiplies row `i` of `m` by `factors[i]`, i.e. `diag(factors) · m`.
pub fn scale_rows(m: &DMatrix<f64>, factors: &DVector<f64>) -> DMatrix<f64> {
    let mut scaled = m.clone();
    for (mut row, factor) in scaled.row_iter_mut().zip(factors.iter()) {
        row *= *factor;
    }
    scaled
}

/// Solves `A X = B` through an LU factorization.
pub fn solve(a: &DMatrix<f64>, b: &DMatrix<f64>, what: &'static str) -> Result<DMatrix<f64>> {
    let x = a
        .clone()
        .lu()
        .solve(b)
        .ok_or(AnalysisError::SingularMatrix(what))?;
    finite_or_singular(x, what)
}

/// Solves `A x = b` through an LU factorization.
pub fn solve_vector(a: &DMatrix<f64>, b: &DVector<f64>, what: &'static str) -> Result<DVector<f64>> {
    let x = a
        .clone()
        .lu()
        .solve(b)
        .ok_or(AnalysisError::SingularMatrix(what))?;
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(AnalysisError::SingularMatrix(what))
    }
}

/// Materialises `A⁻¹`. Prefer [`solve`] when only the action on a vector is needed.
pub fn inverse(a: &DMatrix<f64>, what: &'static str) -> Result<DMatrix<f64>> {
    let inv = a
        .clone()
        .try_inverse()
        .ok_or(AnalysisError::SingularMatrix(what))?;
    finite_or_singular(inv, what)
}

fn finite_or_singular(m: DMatrix<f64>, what: &'static str) -> Result<DMatrix<f64>> {
    if m.iter().all(|v| v.is_finite()) {
        Ok(m)
    } else {
        Err(AnalysisError::SingularMatrix(what))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_split_perturbations_have_zero_mean() {
        let x = DMatrix::from_row_slice(2, 4, &[1.0, 2.0, 3.0, 6.0, -1.0, 0.0, 1.0, 4.0]);
        let split = EnsembleSplit::new(&x);

        assert_abs_diff_eq!(split.mean[0], 3.0, epsilon = EPS);
        assert_abs_diff_eq!(split.mean[1], 1.0, epsilon = EPS);
        for row in split.perturbations.row_iter() {
            assert_abs_diff_eq!(row.sum(), 0.0, epsilon = EPS);
        }
        assert_abs_diff_eq!(split.perturbations[(0, 3)], 3.0, epsilon = EPS);

        let back = EnsembleSplit::recompose(&split.mean, split.perturbations.clone());
        assert_abs_diff_eq!(back, x, epsilon = EPS);
    }

    #[test]
    fn test_spread_matches_sample_std() {
        // Sample variance of [1, 2, 3, 6] is 14/3.
        let x = DMatrix::from_row_slice(1, 4, &[1.0, 2.0, 3.0, 6.0]);
        assert_abs_diff_eq!(ensemble_spread(&x), (14.0_f64 / 3.0).sqrt(), epsilon = EPS);
        assert_eq!(ensemble_spread(&DMatrix::zeros(3, 1)), 0.0);
    }

    #[test]
    fn test_hadamard_rejects_shape_mismatch() {
        let w = DMatrix::from_element(2, 3, 0.5);
        let m = DMatrix::from_element(3, 2, 2.0);
        let err = hadamard(&w, &m, "weights").unwrap_err();
        assert!(matches!(err, AnalysisError::DimensionMismatch { what: "weights", .. }));

        let ok = hadamard(&w, &m.transpose(), "weights").unwrap();
        assert_abs_diff_eq!(ok, DMatrix::from_element(2, 3, 1.0), epsilon = EPS);
    }

    #[test]
    fn test_scale_rows() {
        let m = DMatrix::from_element(2, 2, 1.0);
        let scaled = scale_rows(&m, &DVector::from_vec(vec![2.0, -1.0]));
        assert_abs_diff_eq!(scaled, DMatrix::from_row_slice(2, 2, &[2.0, 2.0, -1.0, -1.0]), epsilon = EPS);
    }

    #[test]
    fn test_solve_and_inverse_agree() {
        let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0]);
        let b = DVector::from_vec(vec![1.0, -2.0, 0.5]);

        let x = solve_vector(&a, &b, "test system").unwrap();
        let via_inverse = inverse(&a, "test system").unwrap() * &b;
        assert_abs_diff_eq!(x, via_inverse, epsilon = 1e-12);
        assert_abs_diff_eq!(&a * &x, b, epsilon = 1e-12);

        let bm = DMatrix::from_fn(3, 2, |i, j| (i + j) as f64);
        let xm = solve(&a, &bm, "test system").unwrap();
        assert_abs_diff_eq!(&a * xm, bm, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_system_is_an_error() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);
        assert_eq!(
            solve_vector(&a, &b, "duplicate rows"),
            Err(AnalysisError::SingularMatrix("duplicate rows"))
        );
        assert_eq!(
            inverse(&a, "duplicate rows"),
            Err(AnalysisError::SingularMatrix("duplicate rows"))
        );
    }
}
