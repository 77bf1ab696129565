// enkf_sim/src/error.rs

use std::path::PathBuf;

use enkf_core::prelude::AnalysisError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to load scenario: {0}")]
    Config(#[from] figment::Error),

    #[error("invalid scenario `{scenario}`: {reason}")]
    InvalidScenario { scenario: String, reason: String },

    #[error("scenario directory {0:?} does not exist")]
    MissingScenarioDir(PathBuf),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("failed to serialise report: {0}")]
    Report(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
