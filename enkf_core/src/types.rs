// enkf_core/src/types.rs

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

// --- Core Type Aliases ---
/// Ensemble matrices are stored one member per column (`N × Ne`).
pub type Ensemble = DMatrix<f64>;
pub type ObsVector = DVector<f64>;

/// A location on the sphere, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}
