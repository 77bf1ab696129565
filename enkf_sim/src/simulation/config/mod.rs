// enkf_sim/src/simulation/config/mod.rs

//! This module handles loading, overriding and validating scenario
//! configuration from disk.

mod catalog;

pub mod structs;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use std::path::Path;
use tracing::info;

use crate::error::{Result, SimError};
pub use catalog::discover_scenarios;
use enkf_core::prelude::FilterKind;
pub use structs::{EnsembleConfig, GridConfig, LocalizationConfig, ObservationConfig, ScenarioConfig};

/// Loads a scenario file on top of the built-in defaults and validates it.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig> {
    info!("Loading scenario from: {:?}", path);
    let mut config: ScenarioConfig = base_figment().merge(Toml::file(path)).extract()?;

    // A scenario without a name is called after its file.
    if config.name == ScenarioConfig::default().name {
        if let Some(stem) = path.file_stem() {
            config.name = stem.to_string_lossy().into_owned();
        }
    }
    config.validate()?;
    Ok(config)
}

/// Parses a scenario from an in-memory TOML document.
pub fn scenario_from_str(toml: &str) -> Result<ScenarioConfig> {
    let config: ScenarioConfig = base_figment().merge(Toml::string(toml)).extract()?;
    config.validate()?;
    Ok(config)
}

fn base_figment() -> Figment {
    Figment::from(Serialized::defaults(ScenarioConfig::default()))
}

impl ScenarioConfig {
    /// Applies command-line overrides and re-validates the result.
    pub fn with_overrides(mut self, filter: Option<FilterKind>, seed: Option<u64>) -> Result<Self> {
        if let Some(filter) = filter {
            self.filter = filter;
        }
        if seed.is_some() {
            self.seed = seed;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let grid = &self.grid;
        if !(grid.lat_min < grid.lat_max && grid.lat_min >= -90.0 && grid.lat_max <= 90.0) {
            return Err(self.invalid("grid latitudes must satisfy -90 <= lat_min < lat_max <= 90"));
        }
        if !(grid.lon_min < grid.lon_max) {
            return Err(self.invalid("grid longitudes must satisfy lon_min < lon_max"));
        }
        if grid.lat_count < 2 || grid.lon_count < 2 {
            return Err(self.invalid("the grid needs at least 2 points along each axis"));
        }

        let ensemble = &self.ensemble;
        if ensemble.members < 2 {
            return Err(self.invalid("the ensemble needs at least 2 members"));
        }
        if !(ensemble.perturbation_std > 0.0 && ensemble.correlation_km > 0.0) {
            return Err(self.invalid("perturbation_std and correlation_km must be positive"));
        }
        if !ensemble.bias.is_finite() {
            return Err(self.invalid("bias must be finite"));
        }

        let obs = &self.observations;
        if !(obs.error_variance > 0.0 && obs.error_variance.is_finite()) {
            return Err(self.invalid("error_variance must be positive and finite"));
        }
        if !(0.0..=1.0).contains(&obs.active_fraction) {
            return Err(self.invalid("active_fraction must lie in [0, 1]"));
        }

        match self.localization.cov_len_km {
            Some(cov_len) if !(cov_len > 0.0) => {
                Err(self.invalid("cov_len_km must be positive"))
            }
            None if self.filter.is_localized() => Err(self.invalid(
                "localized schemes need [localization] cov_len_km",
            )),
            _ => Ok(()),
        }
    }

    fn invalid(&self, reason: &str) -> SimError {
        SimError::InvalidScenario {
            scenario: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}
