// enkf_sim/src/simulation/report.rs

use std::fmt;

use enkf_core::prelude::FilterKind;
use nalgebra::DVector;
use serde::Serialize;

use crate::error::Result;

/// Skill of one analysis step against the known truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub scenario: String,
    pub filter: FilterKind,
    pub seed: u64,
    pub state_dim: usize,
    pub candidate_observations: usize,
    pub active_observations: usize,
    pub members: usize,
    pub prior_rmse: f64,
    pub posterior_rmse: f64,
    pub prior_spread: f64,
    pub posterior_spread: f64,
}

impl AnalysisReport {
    /// Relative RMSE reduction; positive when the analysis helped.
    pub fn improvement(&self) -> f64 {
        if self.prior_rmse > 0.0 {
            1.0 - self.posterior_rmse / self.prior_rmse
        } else {
            0.0
        }
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "scenario   {} (seed {})", self.scenario, self.seed)?;
        writeln!(f, "filter     {}", self.filter)?;
        writeln!(
            f,
            "dimensions Nx = {}, Ny = {} of {}, Ne = {}",
            self.state_dim, self.active_observations, self.candidate_observations, self.members
        )?;
        writeln!(f, "             {:>10} {:>10}", "prior", "posterior")?;
        writeln!(f, "rmse         {:>10.4} {:>10.4}", self.prior_rmse, self.posterior_rmse)?;
        writeln!(f, "spread       {:>10.4} {:>10.4}", self.prior_spread, self.posterior_spread)?;
        write!(f, "improvement  {:>9.1}%", 100.0 * self.improvement())
    }
}

/// A set of reports serialised as `[[report]]` tables.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportBatch {
    pub report: Vec<AnalysisReport>,
}

impl ReportBatch {
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }
}

/// Root-mean-square difference between an estimate and the truth.
pub fn rmse(estimate: &DVector<f64>, truth: &DVector<f64>) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    ((estimate - truth).norm_squared() / truth.len() as f64).sqrt()
}
