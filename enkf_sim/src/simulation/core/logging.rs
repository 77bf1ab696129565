// enkf_sim/src/simulation/core/logging.rs

use tracing_subscriber::EnvFilter;

/// Default to info level, but show `debug` messages from both of our crates.
pub const DEFAULT_LOG_FILTER: &str = "info,enkf_core=debug,enkf_sim=debug";

/// Installs the global `tracing` subscriber. Logs go to stderr so that
/// reports on stdout stay machine readable.
///
/// An explicit `directive` wins over `RUST_LOG`, which wins over
/// [`DEFAULT_LOG_FILTER`].
pub fn init_logging(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}
