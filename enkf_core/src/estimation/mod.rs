// enkf_core/src/estimation/mod.rs

use std::fmt::{self, Debug};
use std::str::FromStr;

use dyn_clone::DynClone;
use nalgebra::{DMatrix, DVector};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::linalg::{ensure_shape, EnsembleSplit};
use crate::localization::LocalizationMatrices;

pub use crate::linalg::Tolerances;

pub mod filters;

#[cfg(test)]
mod tests;

/// Everything one analysis step consumes, borrowed from the caller and
/// validated once on construction.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    prior: &'a DMatrix<f64>,
    predicted: &'a DMatrix<f64>,
    observations: &'a DVector<f64>,
    obs_variance: &'a DVector<f64>,
    localization: Option<&'a LocalizationMatrices>,
}

impl<'a> AnalysisInput<'a> {
    /// # Arguments
    /// * `prior`: prior ensemble `Xf` (`Nx × Ne`, one member per column).
    /// * `predicted`: the prior mapped into observation space, `HXf` (`Ny × Ne`).
    /// * `observations`: observation vector `Y` (length `Ny`).
    /// * `obs_variance`: diagonal of the observation-error covariance `R` (length `Ny`, all > 0).
    pub fn new(
        prior: &'a DMatrix<f64>,
        predicted: &'a DMatrix<f64>,
        observations: &'a DVector<f64>,
        obs_variance: &'a DVector<f64>,
    ) -> Result<Self> {
        let members = prior.ncols();
        if members < 2 {
            return Err(AnalysisError::TooFewMembers(members));
        }
        ensure_shape(predicted, predicted.nrows(), members, "predicted observation members")?;

        let ny = predicted.nrows();
        if observations.len() != ny {
            return Err(AnalysisError::DimensionMismatch {
                what: "observation vector",
                expected: ny,
                found: observations.len(),
            });
        }
        if obs_variance.len() != ny {
            return Err(AnalysisError::DimensionMismatch {
                what: "observation error variances",
                expected: ny,
                found: obs_variance.len(),
            });
        }
        if let Some(bad) = obs_variance.iter().find(|r| !(**r > 0.0 && r.is_finite())) {
            return Err(AnalysisError::InvalidParameter {
                name: "observation error variance",
                value: *bad,
                reason: "must be positive and finite",
            });
        }
        ensure_finite(prior.iter(), "prior ensemble member")?;
        ensure_finite(predicted.iter(), "predicted observation")?;
        ensure_finite(observations.iter(), "observation")?;

        Ok(Self {
            prior,
            predicted,
            observations,
            obs_variance,
            localization: None,
        })
    }

    /// Attaches taper matrices already sliced to the active observations.
    pub fn with_localization(mut self, localization: &'a LocalizationMatrices) -> Result<Self> {
        ensure_shape(
            localization.ph_loc(),
            self.state_dim(),
            self.obs_dim(),
            "PH localization",
        )?;
        ensure_shape(
            localization.hph_loc(),
            self.obs_dim(),
            self.obs_dim(),
            "HPH localization",
        )?;
        self.localization = Some(localization);
        Ok(self)
    }

    pub fn prior(&self) -> &'a DMatrix<f64> {
        self.prior
    }

    pub fn predicted(&self) -> &'a DMatrix<f64> {
        self.predicted
    }

    pub fn observations(&self) -> &'a DVector<f64> {
        self.observations
    }

    pub fn obs_variance(&self) -> &'a DVector<f64> {
        self.obs_variance
    }

    pub fn localization(&self) -> Option<&'a LocalizationMatrices> {
        self.localization
    }

    pub fn state_dim(&self) -> usize {
        self.prior.nrows()
    }

    pub fn obs_dim(&self) -> usize {
        self.predicted.nrows()
    }

    pub fn members(&self) -> usize {
        self.prior.ncols()
    }

    pub(crate) fn require_localization(&self, scheme: &'static str) -> Result<&'a LocalizationMatrices> {
        self.localization
            .ok_or(AnalysisError::MissingLocalization(scheme))
    }

    /// The mean/perturbation split of both ensembles and the innovation
    /// `d = Y - mean(HXf)`, common to every scheme.
    pub(crate) fn prepare(&self) -> Prepared {
        let state = EnsembleSplit::new(self.prior);
        let obs = EnsembleSplit::new(self.predicted);
        let innovation = self.observations - &obs.mean;
        Prepared {
            state,
            obs,
            innovation,
            members: self.members(),
        }
    }
}

fn ensure_finite<'v>(mut values: impl Iterator<Item = &'v f64>, name: &'static str) -> Result<()> {
    match values.find(|v| !v.is_finite()) {
        Some(bad) => Err(AnalysisError::InvalidParameter {
            name,
            value: *bad,
            reason: "must be finite",
        }),
        None => Ok(()),
    }
}

pub(crate) struct Prepared {
    pub state: EnsembleSplit,
    pub obs: EnsembleSplit,
    pub innovation: DVector<f64>,
    pub members: usize,
}

impl Prepared {
    /// `Ne - 1`, the divisor of every sample covariance.
    pub fn dof(&self) -> f64 {
        (self.members - 1) as f64
    }
}

/// The contract shared by every analysis-step variant.
///
/// Implementations are stateless apart from their tolerances: one call maps
/// `(Xf, HXf, Y, R[, localization])` to a posterior ensemble of the same shape
/// as `Xf`. The random source is only drawn from by stochastic schemes.
pub trait AnalysisScheme: DynClone + Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn requires_localization(&self) -> bool {
        false
    }

    fn is_stochastic(&self) -> bool {
        false
    }

    /// The variant itself. Only called with at least one observation and,
    /// for localized schemes, with localization matrices attached.
    fn update(&self, input: &AnalysisInput<'_>, rng: &mut dyn RngCore) -> Result<DMatrix<f64>>;

    /// Runs one analysis step and returns the posterior ensemble `Xa`.
    fn analyze(&self, input: &AnalysisInput<'_>, rng: &mut dyn RngCore) -> Result<DMatrix<f64>> {
        if self.requires_localization() && input.localization().is_none() {
            return Err(AnalysisError::MissingLocalization(self.name()));
        }
        debug!(
            "{}: Nx = {}, Ny = {}, Ne = {}",
            self.name(),
            input.state_dim(),
            input.obs_dim(),
            input.members()
        );
        if input.obs_dim() == 0 {
            return Ok(input.prior().clone());
        }
        self.update(input, rng)
    }
}

dyn_clone::clone_trait_object!(AnalysisScheme);

/// Selects an analysis scheme by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Stochastic EnKF with perturbed observations.
    Senkf,
    SenkfLocalized,
    /// Square-root filter through an eigendecomposition and an SVD.
    Ensrf,
    /// Whitaker-Hamill square-root filter in direct (matrix) form.
    EnsrfDirect,
    EnsrfDirectLocalized,
    /// Square-root filter that assimilates one observation at a time.
    EnsrfSerial,
    Etkf,
    /// ETKF with Livings' pre-whitening and an SVD.
    EtkfLivings,
    /// Error-subspace transform Kalman filter.
    Estkf,
}

impl FilterKind {
    pub const ALL: [FilterKind; 9] = [
        FilterKind::Senkf,
        FilterKind::SenkfLocalized,
        FilterKind::Ensrf,
        FilterKind::EnsrfDirect,
        FilterKind::EnsrfDirectLocalized,
        FilterKind::EnsrfSerial,
        FilterKind::Etkf,
        FilterKind::EtkfLivings,
        FilterKind::Estkf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Senkf => "senkf",
            FilterKind::SenkfLocalized => "senkf_localized",
            FilterKind::Ensrf => "ensrf",
            FilterKind::EnsrfDirect => "ensrf_direct",
            FilterKind::EnsrfDirectLocalized => "ensrf_direct_localized",
            FilterKind::EnsrfSerial => "ensrf_serial",
            FilterKind::Etkf => "etkf",
            FilterKind::EtkfLivings => "etkf_livings",
            FilterKind::Estkf => "estkf",
        }
    }

    pub fn is_localized(&self) -> bool {
        matches!(self, FilterKind::SenkfLocalized | FilterKind::EnsrfDirectLocalized)
    }

    pub fn is_stochastic(&self) -> bool {
        matches!(self, FilterKind::Senkf | FilterKind::SenkfLocalized)
    }

    pub fn build(self, tolerances: Tolerances) -> Box<dyn AnalysisScheme> {
        use filters::*;
        match self {
            FilterKind::Senkf => Box::new(senkf::StochasticEnkf::new(tolerances)),
            FilterKind::SenkfLocalized => Box::new(senkf::StochasticEnkfLocalized::new(tolerances)),
            FilterKind::Ensrf => Box::new(ensrf::Ensrf::new(tolerances)),
            FilterKind::EnsrfDirect => Box::new(ensrf_direct::EnsrfDirect::new(tolerances)),
            FilterKind::EnsrfDirectLocalized => {
                Box::new(ensrf_direct::EnsrfDirectLocalized::new(tolerances))
            }
            FilterKind::EnsrfSerial => Box::new(ensrf_serial::EnsrfSerial::new(tolerances)),
            FilterKind::Etkf => Box::new(etkf::Etkf::new(tolerances)),
            FilterKind::EtkfLivings => Box::new(etkf::EtkfLivings::new(tolerances)),
            FilterKind::Estkf => Box::new(estkf::Estkf::new(tolerances)),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        FilterKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| AnalysisError::UnknownFilter(s.to_string()))
    }
}
