// enkf_sim/src/cli.rs

use clap::{Parser, ValueEnum};
use enkf_core::prelude::FilterKind;
use std::path::PathBuf;

/// Runs one ensemble Kalman analysis step on a synthetic twin experiment
/// described by a scenario TOML file and reports its skill.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/00_baseline.toml")]
    pub scenario: PathBuf,

    /// Run every `*.toml` scenario below this directory instead of `--scenario`.
    #[arg(long)]
    pub scenario_dir: Option<PathBuf>,

    /// Override the analysis scheme named in the scenario (e.g. `etkf`, `ensrf-serial`).
    #[arg(short, long, value_parser = parse_filter)]
    pub filter: Option<FilterKind>,

    /// Override the scenario's random seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// How reports are written to stdout.
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// A `tracing` filter directive; takes precedence over `RUST_LOG`.
    #[arg(long)]
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Toml,
}

fn parse_filter(s: &str) -> Result<FilterKind, String> {
    s.parse().map_err(|e: enkf_core::prelude::AnalysisError| e.to_string())
}
