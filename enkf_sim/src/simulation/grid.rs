// enkf_sim/src/simulation/grid.rs

use enkf_core::prelude::{GeoPoint, GeodesicDistance};
use nalgebra::DVector;
use rand::Rng;

use crate::simulation::config::GridConfig;

/// A regular latitude/longitude grid. The state vector is stacked row-major
/// over `(lat, lon)`: index `i * lon_count + j` is latitude row `i`,
/// longitude column `j`.
#[derive(Debug, Clone)]
pub struct Grid {
    config: GridConfig,
    points: Vec<GeoPoint>,
}

impl Grid {
    pub fn new(config: &GridConfig) -> Self {
        let lats = linspace(config.lat_min, config.lat_max, config.lat_count);
        let points = lats
            .flat_map(|lat| {
                linspace(config.lon_min, config.lon_max, config.lon_count)
                    .map(move |lon| GeoPoint::new(lat, lon))
            })
            .collect();
        Self {
            config: *config,
            points,
        }
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The synthetic truth: a zonal wave whose amplitude follows the
    /// latitude circles, on top of a meridional gradient.
    pub fn truth(&self) -> DVector<f64> {
        let lat_mid = 0.5 * (self.config.lat_min + self.config.lat_max);
        DVector::from_iterator(
            self.len(),
            self.points.iter().map(|p| {
                let wave = 3.0 * (6.0 * p.lon.to_radians()).sin() * p.lat.to_radians().cos();
                wave + 0.05 * (p.lat - lat_mid)
            }),
        )
    }

    /// Index of the grid point closest to `site`.
    pub fn nearest<D: GeodesicDistance + ?Sized>(&self, site: &GeoPoint, distance: &D) -> usize {
        self.points
            .iter()
            .map(|p| distance.distance(p, site))
            .enumerate()
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map_or(0, |(i, _)| i)
    }

    /// A location drawn uniformly in latitude and longitude within the bounds.
    pub fn sample_location<R: Rng + ?Sized>(&self, rng: &mut R) -> GeoPoint {
        GeoPoint::new(
            rng.gen_range(self.config.lat_min..=self.config.lat_max),
            rng.gen_range(self.config.lon_min..=self.config.lon_max),
        )
    }
}

fn linspace(min: f64, max: f64, count: usize) -> impl Iterator<Item = f64> + Clone {
    let step = if count > 1 {
        (max - min) / (count - 1) as f64
    } else {
        0.0
    };
    (0..count).map(move |k| min + step * k as f64)
}
