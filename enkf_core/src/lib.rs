// enkf_core/src/lib.rs

//! Analysis (update) step of ensemble Kalman filters for data assimilation.
//!
//! The crate is a pure numeric core: callers hand in a prior ensemble, the
//! ensemble mapped into observation space, the observations and their error
//! variances, and get back a posterior ensemble. Nine interchangeable
//! variants live under [`estimation::filters`]; the Gaspari-Cohn
//! localization used by the localized variants lives in [`localization`].

pub mod error;
pub mod estimation;
pub mod linalg;
pub mod localization;
pub mod prelude;
pub mod types;
