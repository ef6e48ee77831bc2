//! Logging initialization.
//!
//! Thin wrapper over the `observability` package so binaries configure
//! logging from [`crate::Config`] and [`crate::Paths`] in one call.

use std::path::PathBuf;

/// Service name written into every log line.
const SERVICE_NAME: &str = "summarizer";

/// Initialize structured logging.
///
/// * `level` - default filter, overridden by `RUST_LOG`
/// * `log_path` - JSONL file, `None` for the default location
/// * `also_stderr` - mirror compact logs on stderr
///
/// ```ignore
/// init_logging("info", Some(paths.log_file()), false);
/// tracing::info!("summarizer started");
/// ```
pub fn init_logging(level: &str, log_path: Option<PathBuf>, also_stderr: bool) {
    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: parse_level(level).to_string().to_lowercase(),
        log_path,
        also_stderr,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
