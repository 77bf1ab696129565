// enkf_core/src/error.rs

use thiserror::Error;

/// Everything that can go wrong while building localization matrices or
/// running an analysis step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("an ensemble needs at least 2 members, got {0}")]
    TooFewMembers(usize),

    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("matrix is singular or too ill-conditioned to invert: {0}")]
    SingularMatrix(&'static str),

    /// A negative eigenvalue was too large to be written off as round-off,
    /// so the requested square root would carry a real imaginary part.
    #[error("square root of {what} has imaginary component {imaginary:.3e} (tolerance {tolerance:.3e})")]
    ComplexSquareRoot {
        what: &'static str,
        imaginary: f64,
        tolerance: f64,
    },

    #[error("decomposition did not produce {0}")]
    DecompositionFailed(&'static str),

    #[error("{0} requires localization matrices but none were supplied")]
    MissingLocalization(&'static str),

    #[error("unknown analysis scheme `{0}`")]
    UnknownFilter(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
