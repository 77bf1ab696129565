// enkf_core/src/estimation/filters/mod.rs

//! Concrete analysis schemes. Each one implements [`super::AnalysisScheme`].

pub mod ensrf;
pub mod ensrf_direct;
pub mod ensrf_serial;
pub mod estkf;
pub mod etkf;
pub mod senkf;
