//! Logging and diagnostics bootstrap.

use addin_config_and_utils::{init_logging, observability_mode_from_env, Config, Paths};
use observability::{
    DiagnosticsSink, NoopDiagnostics, ObservabilityMode, RemoteDiagnostics,
    RemoteDiagnosticsConfig,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Install the tracing subscriber and build the diagnostics sink.
///
/// Logs go to the add-in log file. Reports are exported when
/// `diagnostics_url` is set and dropped otherwise.
pub fn init_observability(config: &Config, paths: &Paths) -> Arc<dyn DiagnosticsSink> {
    let log_path = match paths.ensure_dirs() {
        Ok(()) => Some(paths.log_file()),
        Err(err) => {
            eprintln!("addin: cannot create log directory: {}", err);
            None
        }
    };
    init_logging(&config.log_level, log_path);

    let Some(endpoint) = config.diagnostics_url.as_deref() else {
        info!("Diagnostics export disabled");
        return Arc::new(NoopDiagnostics);
    };

    let mut remote = RemoteDiagnosticsConfig::new(endpoint, "addin");
    remote.mode = observability_mode_from_env();
    if remote.mode == ObservabilityMode::ProdMetadataOnly {
        remote.environment = "production".into();
    }

    match RemoteDiagnostics::spawn(remote) {
        Ok(sink) => {
            info!(endpoint = %endpoint, "Diagnostics export enabled");
            Arc::new(sink)
        }
        Err(err) => {
            warn!(error = %err, "Failed to start diagnostics export");
            Arc::new(NoopDiagnostics)
        }
    }
}
