//! Logging setup shared by the CLI and embedding applications.

use crate::Result;
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable single-line output
    #[default]
    Text,
    /// Newline-delimited JSON objects
    Json,
}

/// Maps CLI verbosity flags onto a tracing level.
fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Builds the event filter. `RUST_LOG`-style directives win over the
/// verbosity level; unparsable directives fall back to it.
fn filter_for(level: tracing::Level, directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|dirs| EnvFilter::try_new(dirs).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_str()))
}

/// Initializes structured logging based on verbosity level.
///
/// A non-empty `RUST_LOG` replaces the level derived from the flags.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
/// * `format` - Text or JSON output
///
/// # Example
/// ```rust,no_run
/// use schemasurveyor_core::logging::{LogFormat, init_logging};
///
/// init_logging(1, false, LogFormat::Text).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool, format: LogFormat) -> Result<()> {
    let directives = std::env::var("RUST_LOG")
        .ok()
        .filter(|dirs| !dirs.trim().is_empty());
    let filter = filter_for(level_for(verbose, quiet), directives.as_deref());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| {
        crate::error::SurveyError::configuration(format!("Failed to initialize logging: {}", e))
    })
}
