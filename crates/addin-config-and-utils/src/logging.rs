//! Logging initialization for the add-in.
//!
//! Builds an `observability::LogConfig` from the environment so every entry
//! point (task pane runtime, login dialog) logs the same way.

use observability::{LogConfig, ObservabilityMode};
use std::path::PathBuf;

/// Initialize logging for the add-in runtime.
///
/// `RUST_LOG` wins over `level`. `ADDIN_OBS_MODE=prod` switches diagnostics
/// export to metadata-only.
///
/// ```ignore
/// init_logging("info", None);
/// tracing::info!("runtime started");
/// ```
pub fn init_logging(level: &str, log_path: Option<PathBuf>) {
    init_logging_for_service("addin", level, log_path);
}

/// Initialize logging with a custom service name.
///
/// Use this to tell the login dialog apart from the task pane in a shared
/// log file.
pub fn init_logging_for_service(service_name: &str, level: &str, log_path: Option<PathBuf>) {
    let mode = observability_mode_from_env();
    let environment = match mode {
        ObservabilityMode::ProdMetadataOnly => "production".to_string(),
        ObservabilityMode::DevVerbose => "development".to_string(),
    };

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        also_stderr: log_path.is_none(),
        log_path,
        mode,
        environment,
    });
}

/// `ADDIN_OBS_MODE=prod|production` selects metadata-only export.
pub fn observability_mode_from_env() -> ObservabilityMode {
    match std::env::var("ADDIN_OBS_MODE")
        .unwrap_or_else(|_| "dev".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "prod" | "production" => ObservabilityMode::ProdMetadataOnly,
        _ => ObservabilityMode::DevVerbose,
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
