// enkf_sim/src/main.rs

use clap::Parser;
use std::process::ExitCode;
use tracing::error;

use enkf_sim::prelude::*;
use enkf_sim::simulation::config::{discover_scenarios, load_scenario};
use enkf_sim::simulation::core::logging::init_logging;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs every requested scenario and prints the reports. A failing scenario
/// is logged and skipped; the return value says whether all of them passed.
fn run(cli: &Cli) -> SimResult<bool> {
    let paths = match &cli.scenario_dir {
        Some(dir) => discover_scenarios(dir)?,
        None => vec![cli.scenario.clone()],
    };

    let mut batch = ReportBatch::default();
    let mut all_ok = true;
    for path in &paths {
        let outcome = load_scenario(path)
            .and_then(|config| config.with_overrides(cli.filter, cli.seed))
            .and_then(|config| run_scenario(&config));
        match outcome {
            Ok(report) => batch.report.push(report),
            Err(e) => {
                error!("Scenario {:?} failed: {}. Skipping.", path, e);
                all_ok = false;
            }
        }
    }

    match cli.format {
        ReportFormat::Text => {
            for report in &batch.report {
                println!("{}\n", report);
            }
        }
        ReportFormat::Toml => print!("{}", batch.to_toml()?),
    }
    Ok(all_ok)
}
