//! # Observability
//!
//! Centralized logging and diagnostics layer for the add-in workspace.
//!
//! ## Design Philosophy
//!
//! Components are **log producers**. They call `observability::init()` once at
//! startup (or let the host do it) and use standard `tracing` macros
//! throughout their code. Failures that operators need to see are handed to a
//! [`DiagnosticsSink`], which is fire-and-forget: reporting never blocks the
//! caller and never fails.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init("addin");
//! tracing::info!("ready");
//! ```
//!
//! Or with configuration:
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "addin".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/tmp/addin.jsonl".into()),
//!     ..Default::default()
//! });
//! ```

mod diagnostics;
mod file_writer;
mod remote;

use std::path::PathBuf;

pub use diagnostics::{
    DiagnosticReport, DiagnosticsSink, NoopDiagnostics, RecordingDiagnostics, Severity,
};
pub use file_writer::{CentralLogWriter, WriterFactory};
pub use remote::{RemoteDiagnostics, RemoteDiagnosticsConfig};

/// Runtime export policy mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservabilityMode {
    /// Development mode: include verbose payloads after basic secret redaction.
    #[default]
    DevVerbose,
    /// Production mode: export metadata only (no raw messages).
    ProdMetadataOnly,
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "addin", "login-dialog").
    /// Included in the startup line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSON-lines log file.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr. Always on when no log file is configured.
    pub also_stderr: bool,

    /// Runtime observability mode.
    pub mode: ObservabilityMode,

    /// Logical environment name written to diagnostics payloads.
    pub environment: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            mode: ObservabilityMode::DevVerbose,
            environment: "development".into(),
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Calling this more than once is harmless: the first installed subscriber
/// wins and later calls only log at debug level.
pub fn init_with_config(config: LogConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let file_layer = config.log_path.as_ref().and_then(|path| {
        match CentralLogWriter::new(path) {
            Ok(writer) => Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(WriterFactory::new(writer)),
            ),
            Err(err) => {
                eprintln!("observability: failed to open log file {:?}: {}", path, err);
                None
            }
        }
    });

    let stderr_layer = (config.also_stderr || file_layer.is_none()).then(|| {
        fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    match installed {
        Ok(()) => tracing::info!(
            service = %config.service_name,
            environment = %config.environment,
            "observability initialized"
        ),
        Err(_) => tracing::debug!("observability already initialized"),
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
        assert_eq!(config.mode, ObservabilityMode::DevVerbose);
        assert_eq!(config.environment, "development");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init("first");
        init("second");
    }
}
