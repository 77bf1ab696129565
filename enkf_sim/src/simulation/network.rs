// enkf_sim/src/simulation/network.rs

use enkf_core::prelude::{GeoPoint, GeodesicDistance};
use nalgebra::{DMatrix, DVector};
use rand::seq::index;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::simulation::config::ObservationConfig;
use crate::simulation::grid::Grid;

/// The full candidate observation network: site locations, the grid point
/// each site observes and the synthetic observations taken from the truth.
#[derive(Debug, Clone)]
pub struct ObservationNetwork {
    pub sites: Vec<GeoPoint>,
    /// The observation operator `H` as a nearest-grid-point lookup.
    pub grid_index: Vec<usize>,
    pub observations: DVector<f64>,
    pub obs_variance: DVector<f64>,
}

impl ObservationNetwork {
    /// Places `config.count` sites uniformly inside the grid and observes the
    /// truth at their nearest grid points with noise `N(0, error_variance)`.
    pub fn generate<R, D>(
        grid: &Grid,
        truth: &DVector<f64>,
        config: &ObservationConfig,
        distance: &D,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
        D: GeodesicDistance + ?Sized,
    {
        let sites: Vec<GeoPoint> = (0..config.count).map(|_| grid.sample_location(&mut *rng)).collect();
        let grid_index: Vec<usize> = sites.iter().map(|s| grid.nearest(s, distance)).collect();

        let std_dev = config.error_variance.sqrt();
        let observations = DVector::from_iterator(
            sites.len(),
            grid_index.iter().map(|&k| {
                let z: f64 = StandardNormal.sample(&mut *rng);
                truth[k] + std_dev * z
            }),
        );

        Self {
            obs_variance: DVector::from_element(sites.len(), config.error_variance),
            sites,
            grid_index,
            observations,
        }
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// `H X`: the ensemble mapped onto every candidate site.
    pub fn predicted(&self, ensemble: &DMatrix<f64>) -> DMatrix<f64> {
        ensemble.select_rows(&self.grid_index)
    }

    pub fn latitudes(&self) -> Vec<f64> {
        self.sites.iter().map(|s| s.lat).collect()
    }

    pub fn longitudes(&self) -> Vec<f64> {
        self.sites.iter().map(|s| s.lon).collect()
    }

    /// Draws the sites that report this cycle, in ascending order.
    pub fn draw_active<R: Rng + ?Sized>(&self, fraction: f64, rng: &mut R) -> Vec<usize> {
        let n = self.len();
        let amount = ((fraction * n as f64).round() as usize).min(n);
        let mut active = index::sample(rng, n, amount).into_vec();
        active.sort_unstable();
        active
    }
}
