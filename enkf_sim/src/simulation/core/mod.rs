// enkf_sim/src/simulation/core/mod.rs

pub mod logging;
pub mod prng;
