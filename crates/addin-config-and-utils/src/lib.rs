//! Configuration, paths and logging setup shared by the add-in crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_BACKEND_URL, DEFAULT_LOGIN_DIALOG_URL, DEFAULT_TOKEN_CACHE_WINDOW_MS,
    DEFAULT_TRIAL_POLL_INTERVAL_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{
    init_logging, init_logging_for_service, observability_mode_from_env, parse_level,
};
pub use paths::Paths;
