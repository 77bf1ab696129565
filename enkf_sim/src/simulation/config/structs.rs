// enkf_sim/src/simulation/config/structs.rs

use enkf_core::prelude::{FilterKind, Tolerances};
use serde::{Deserialize, Serialize};

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

/// # ScenarioConfig
/// Everything needed to run one twin experiment. This struct is the root of
/// the data parsed from a `scenario.toml` file; every section may be omitted
/// and falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    pub name: String,
    /// Optional seed for the pseudo-random number generator for determinism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// The analysis scheme to run, e.g. `"etkf"` or `"ensrf_direct_localized"`.
    pub filter: FilterKind,
    pub tolerances: Tolerances,
    pub grid: GridConfig,
    pub ensemble: EnsembleConfig,
    pub observations: ObservationConfig,
    pub localization: LocalizationConfig,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            name: "unnamed".to_string(),
            seed: None,
            filter: FilterKind::Etkf,
            tolerances: Tolerances::default(),
            grid: GridConfig::default(),
            ensemble: EnsembleConfig::default(),
            observations: ObservationConfig::default(),
            localization: LocalizationConfig::default(),
        }
    }
}

// =========================================================================
// == Configuration Sub-Structs ==
// These map directly to the sections in a scenario.toml file.
// =========================================================================

/// A regular latitude/longitude grid. Bounds are in degrees and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GridConfig {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lat_count: usize,
    pub lon_min: f64,
    pub lon_max: f64,
    pub lon_count: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            lat_min: 30.0,
            lat_max: 60.0,
            lat_count: 12,
            lon_min: -20.0,
            lon_max: 20.0,
            lon_count: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EnsembleConfig {
    pub members: usize,
    /// Amplitude standard deviation of each random perturbation bump.
    pub perturbation_std: f64,
    /// Gaussian length scale of the perturbation bumps, in kilometers.
    pub correlation_km: f64,
    /// Offset added to every member, so the prior mean starts out wrong.
    pub bias: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            members: 20,
            perturbation_std: 1.0,
            correlation_km: 800.0,
            bias: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ObservationConfig {
    /// Number of candidate observation sites.
    pub count: usize,
    /// Observation error variance, shared by every site.
    pub error_variance: f64,
    /// Fraction of the sites that report in this analysis.
    pub active_fraction: f64,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            count: 60,
            error_variance: 0.25,
            active_fraction: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LocalizationConfig {
    /// Gaspari-Cohn length scale in kilometers; the taper reaches zero at
    /// twice this distance. Required by the localized schemes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cov_len_km: Option<f64>,
}
