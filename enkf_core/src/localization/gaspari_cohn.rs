// enkf_core/src/localization/gaspari_cohn.rs

use nalgebra::DMatrix;

use crate::error::{AnalysisError, Result};

/// Gaspari-Cohn (1999, eq. 4.10) compactly supported fifth-order taper.
///
/// `cov_len` is the half-width: the weight is 1 at zero distance and reaches
/// exactly 0 at `2 * cov_len`. An infinite `cov_len` gives weight 1 everywhere.
pub fn gaspari_cohn(distance: f64, cov_len: f64) -> f64 {
    let r = distance.abs() / cov_len;
    let w = if r <= 1.0 {
        -0.25 * r.powi(5) + 0.5 * r.powi(4) + 0.625 * r.powi(3) - 5.0 / 3.0 * r.powi(2) + 1.0
    } else if r < 2.0 {
        1.0 / 12.0 * r.powi(5) - 0.5 * r.powi(4) + 0.625 * r.powi(3) + 5.0 / 3.0 * r.powi(2) - 5.0 * r
            + 4.0
            - 2.0 / (3.0 * r)
    } else {
        0.0
    };
    // Round-off near r = 2 can dip just below zero.
    w.max(0.0)
}

/// Applies [`gaspari_cohn`] element-wise to a matrix of distances.
pub fn gaspari_cohn_matrix(distances: &DMatrix<f64>, cov_len: f64) -> Result<DMatrix<f64>> {
    validate_cov_len(cov_len)?;
    Ok(distances.map(|d| gaspari_cohn(d, cov_len)))
}

pub(crate) fn validate_cov_len(cov_len: f64) -> Result<()> {
    if !(cov_len > 0.0) {
        return Err(AnalysisError::InvalidParameter {
            name: "cov_len",
            value: cov_len,
            reason: "localization radius must be positive",
        });
    }
    Ok(())
}
