// enkf_sim/src/simulation/config/catalog.rs

//! Discovery of scenario files for batch runs.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Result, SimError};

/// Walks `dir` recursively and returns every `.toml` file in it, sorted by
/// path so batch runs are reproducible.
pub fn discover_scenarios(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(SimError::MissingScenarioDir(dir.to_path_buf()));
    }

    info!("Discovering scenarios in: {:?}", dir);

    let mut scenarios: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry below {:?}: {}", dir, e);
                None
            }
        })
        .filter(|e| {
            !e.file_type().is_dir() && e.path().extension().map_or(false, |ext| ext == "toml")
        })
        .map(|e| e.into_path())
        .collect();
    scenarios.sort();

    if scenarios.is_empty() {
        warn!("No scenario files found in {:?}", dir);
    }
    Ok(scenarios)
}
