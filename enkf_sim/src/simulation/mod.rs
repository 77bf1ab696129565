// enkf_sim/src/simulation/mod.rs

pub mod config;
pub mod core;
pub mod grid;
pub mod network;
pub mod report;
pub mod twin;
