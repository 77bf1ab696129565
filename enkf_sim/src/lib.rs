// enkf_sim/src/lib.rs

//! Scenario-driven twin experiments for the `enkf_core` analysis schemes.

// This prelude is for convenience for other files WITHIN the enkf_sim crate.
pub mod prelude;

pub mod cli;
pub mod error;
pub mod simulation;
