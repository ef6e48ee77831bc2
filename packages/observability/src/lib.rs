//! # Observability
//!
//! Structured logging for the summarizer client.
//!
//! Binaries call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Library crates never install a
//! subscriber themselves.
//!
//! Every event is written as one JSON object per line to the configured log
//! file (`~/.summarizer/logs/client.jsonl` by default), which makes
//!
//! - `tail -f ~/.summarizer/logs/client.jsonl | jq` for pretty JSON
//! - `grep auth_state ~/.summarizer/logs/client.jsonl` for quick triage
//!
//! possible without a log collector. Fields whose name looks like a credential
//! (`access_token`, `refresh_token`, `apikey`, ...) are redacted before they
//! reach the file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "summarizer".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod json_layer;
mod writer;

pub use json_layer::{is_sensitive_field, JsonLayer, LogEntry, REDACTED};
pub use writer::{AppendLogWriter, WriterFactory};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the emitting program, included in every log line.
    pub service_name: String,

    /// Default level filter (e.g. "debug", "info", "warn").
    /// Overridden by `RUST_LOG` when set.
    pub default_level: String,

    /// JSONL output file. Defaults to `~/.summarizer/logs/client.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact human-readable logs on stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Default log file location.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join(".summarizer")
            .join("logs")
            .join("client.jsonl")
    })
}

/// Initialize logging with defaults for the given service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize logging with custom configuration.
///
/// If the log file cannot be opened the JSONL layer is skipped and stderr
/// output is forced on so that nothing is silently lost. Calling this twice
/// in one process is a no-op for the second call.
pub fn init_with_config(config: LogConfig) {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let log_path = config.log_path.clone().or_else(default_log_path);
    let file_writer = match log_path.as_ref().map(AppendLogWriter::new) {
        Some(Ok(writer)) => Some(writer),
        Some(Err(e)) => {
            eprintln!("observability: cannot open log file {:?}: {}", log_path, e);
            None
        }
        None => None,
    };

    let json_layer = file_writer.as_ref().map(|writer| {
        JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer.clone()))
            .with_filter(env_filter())
    });

    let stderr_layer = if config.also_stderr || file_writer.is_none() {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(io::stderr)
                .with_filter(env_filter()),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(
            service = %config.service_name,
            log_path = ?log_path,
            "observability initialized"
        );
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }

    #[test]
    fn test_default_log_path_is_under_summarizer_dir() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with(".summarizer/logs/client.jsonl"));
        }
    }
}
