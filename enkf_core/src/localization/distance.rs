// enkf_core/src/localization/distance.rs

use crate::types::GeoPoint;

/// Mean Earth radius in kilometers (IUGG).
pub const MEAN_EARTH_RADIUS_KM: f64 = 6371.0088;

/// The capability the localization builder needs from a distance routine.
///
/// Implementations must be non-negative, symmetric and return zero for
/// identical points. Any closure `Fn(&GeoPoint, &GeoPoint) -> f64` qualifies.
pub trait GeodesicDistance: Send + Sync {
    fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64;
}

impl<F> GeodesicDistance for F
where
    F: Fn(&GeoPoint, &GeoPoint) -> f64 + Send + Sync,
{
    fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        self(a, b)
    }
}

/// Great-circle distance on a sphere via the haversine formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Haversine {
    pub radius_km: f64,
}

impl Default for Haversine {
    fn default() -> Self {
        Self {
            radius_km: MEAN_EARTH_RADIUS_KM,
        }
    }
}

impl GeodesicDistance for Haversine {
    fn distance(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        let lat1 = a.lat.to_radians();
        let lat2 = b.lat.to_radians();
        let dlat = (b.lat - a.lat).to_radians();
        let dlon = (b.lon - a.lon).to_radians();

        let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        // Clamp so round-off cannot push `h` past 1 for antipodal points.
        let h = h.clamp(0.0, 1.0);
        2.0 * self.radius_km * h.sqrt().atan2((1.0 - h).sqrt())
    }
}
