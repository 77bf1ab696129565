// enkf_core/src/localization/mod.rs

//! Covariance localization: Gaspari-Cohn tapers between state grid points
//! and observation sites.
//!
//! The matrices are meant to be built once for the full candidate
//! observation network. When only a subset of the observations is active in
//! a given cycle, the caller slices the matching columns of `ph_loc` and
//! rows/columns of `hph_loc` before handing them to an analysis step.

use nalgebra::DMatrix;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::linalg::ensure_shape;
use crate::types::GeoPoint;

pub mod distance;
pub mod gaspari_cohn;

use distance::{GeodesicDistance, Haversine};
pub use gaspari_cohn::{gaspari_cohn, gaspari_cohn_matrix};

/// The two taper matrices applied by Hadamard product inside the localized
/// analysis schemes.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizationMatrices {
    ph_loc: DMatrix<f64>,
    hph_loc: DMatrix<f64>,
}

impl LocalizationMatrices {
    /// Wraps caller-supplied tapers after checking their shapes and that every
    /// weight lies in `[0, 1]`.
    pub fn new(ph_loc: DMatrix<f64>, hph_loc: DMatrix<f64>) -> Result<Self> {
        let ny = hph_loc.nrows();
        ensure_shape(&hph_loc, ny, ny, "HPH localization")?;
        ensure_shape(&ph_loc, ph_loc.nrows(), ny, "PH localization columns")?;

        for value in ph_loc.iter().chain(hph_loc.iter()) {
            if !(0.0..=1.0).contains(value) {
                return Err(AnalysisError::InvalidParameter {
                    name: "localization weight",
                    value: *value,
                    reason: "taper weights must lie in [0, 1]",
                });
            }
        }
        Ok(Self { ph_loc, hph_loc })
    }

    /// Tapers that leave every covariance untouched.
    pub fn unit(state_dim: usize, obs_dim: usize) -> Self {
        Self {
            ph_loc: DMatrix::from_element(state_dim, obs_dim, 1.0),
            hph_loc: DMatrix::from_element(obs_dim, obs_dim, 1.0),
        }
    }

    /// Computes every model-to-observation and observation-to-observation
    /// distance and tapers them with Gaspari-Cohn.
    ///
    /// The order of `obs_lat`/`obs_lon` must match the row order of `HXf` and
    /// `Y` in the analysis step.
    pub fn build<D>(
        state_points: &[GeoPoint],
        obs_lat: &[f64],
        obs_lon: &[f64],
        cov_len: f64,
        distance: &D,
    ) -> Result<Self>
    where
        D: GeodesicDistance + ?Sized,
    {
        if obs_lat.len() != obs_lon.len() {
            return Err(AnalysisError::DimensionMismatch {
                what: "observation longitudes",
                expected: obs_lat.len(),
                found: obs_lon.len(),
            });
        }
        gaspari_cohn::validate_cov_len(cov_len)?;

        let sites: Vec<GeoPoint> = obs_lat
            .iter()
            .zip(obs_lon)
            .map(|(&lat, &lon)| GeoPoint::new(lat, lon))
            .collect();
        for point in state_points.iter().chain(sites.iter()) {
            if !point.is_finite() {
                return Err(AnalysisError::InvalidParameter {
                    name: "coordinate",
                    value: if point.lat.is_finite() { point.lon } else { point.lat },
                    reason: "coordinates must be finite",
                });
            }
        }

        let nx = state_points.len();
        let ny = sites.len();
        debug!("building localization for {} grid points, {} sites, cov_len {}", nx, ny, cov_len);

        let model_to_site =
            DMatrix::from_fn(nx, ny, |i, j| distance.distance(&state_points[i], &sites[j]));
        let site_to_site = DMatrix::from_fn(ny, ny, |i, j| distance.distance(&sites[i], &sites[j]));

        Ok(Self {
            ph_loc: gaspari_cohn_matrix(&model_to_site, cov_len)?,
            hph_loc: gaspari_cohn_matrix(&site_to_site, cov_len)?,
        })
    }

    /// Taper for the state/observation cross covariance `P Hᵀ` (`Nx × Ny`).
    pub fn ph_loc(&self) -> &DMatrix<f64> {
        &self.ph_loc
    }

    /// Taper for the observation/observation covariance `H P Hᵀ` (`Ny × Ny`).
    pub fn hph_loc(&self) -> &DMatrix<f64> {
        &self.hph_loc
    }

    pub fn state_dim(&self) -> usize {
        self.ph_loc.nrows()
    }

    pub fn obs_dim(&self) -> usize {
        self.hph_loc.nrows()
    }
}

/// [`LocalizationMatrices::build`] with great-circle distances in kilometers.
pub fn build_localization(
    state_points: &[GeoPoint],
    obs_lat: &[f64],
    obs_lon: &[f64],
    cov_len_km: f64,
) -> Result<LocalizationMatrices> {
    LocalizationMatrices::build(state_points, obs_lat, obs_lon, cov_len_km, &Haversine::default())
}
