// enkf_sim/src/prelude.rs

// Re-export the entire enkf_core prelude so the driver can reach the
// analysis schemes and localization types directly.
pub use enkf_core::prelude::*;

pub use crate::cli::{Cli, ReportFormat};
pub use crate::error::{Result as SimResult, SimError};
pub use crate::simulation::config::structs::*;
pub use crate::simulation::core::prng::SimulationRng;
pub use crate::simulation::report::{AnalysisReport, ReportBatch};
pub use crate::simulation::twin::{run_scenario, select_active, ActiveObservations, TwinExperiment};
