//! Configuration management for the add-in.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default licensing backend URL (can be overridden at compile time via ADDIN_BACKEND_URL).
pub const DEFAULT_BACKEND_URL: &str = match option_env!("ADDIN_BACKEND_URL") {
    Some(url) => url,
    None => "https://localhost:3000/api",
};

/// Default login dialog route (can be overridden at compile time via ADDIN_LOGIN_DIALOG_URL).
pub const DEFAULT_LOGIN_DIALOG_URL: &str = match option_env!("ADDIN_LOGIN_DIALOG_URL") {
    Some(url) => url,
    None => "https://localhost:3000/login",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// How long a primary access token is served from cache.
pub const DEFAULT_TOKEN_CACHE_WINDOW_MS: u64 = 10_000;

/// How often trial expiry is re-evaluated.
pub const DEFAULT_TRIAL_POLL_INTERVAL_MS: u64 = 5_000;

const DEFAULT_DIALOG_HEIGHT_PCT: u8 = 60;
const DEFAULT_DIALOG_WIDTH_PCT: u8 = 30;

/// Main add-in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Licensing backend base URL (`/identify` and `/activate` live under it).
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Same-origin login route opened in the fallback dialog.
    #[serde(default = "default_login_dialog_url")]
    pub login_dialog_url: String,
    /// Dialog height as a percentage of the host window.
    #[serde(default = "default_dialog_height_pct")]
    pub dialog_height_pct: u8,
    /// Dialog width as a percentage of the host window.
    #[serde(default = "default_dialog_width_pct")]
    pub dialog_width_pct: u8,
    #[serde(default = "default_token_cache_window_ms")]
    pub token_cache_window_ms: u64,
    #[serde(default = "default_trial_poll_interval_ms")]
    pub trial_poll_interval_ms: u64,
    /// Scopes requested from the identity provider on the fallback path.
    #[serde(default = "default_fallback_scopes")]
    pub fallback_scopes: Vec<String>,
    /// Optional diagnostics collector endpoint.
    #[serde(default)]
    pub diagnostics_url: Option<String>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_login_dialog_url() -> String {
    DEFAULT_LOGIN_DIALOG_URL.to_string()
}

fn default_dialog_height_pct() -> u8 {
    DEFAULT_DIALOG_HEIGHT_PCT
}

fn default_dialog_width_pct() -> u8 {
    DEFAULT_DIALOG_WIDTH_PCT
}

fn default_token_cache_window_ms() -> u64 {
    DEFAULT_TOKEN_CACHE_WINDOW_MS
}

fn default_trial_poll_interval_ms() -> u64 {
    DEFAULT_TRIAL_POLL_INTERVAL_MS
}

fn default_fallback_scopes() -> Vec<String> {
    vec!["openid".into(), "profile".into(), "email".into()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            backend_url: default_backend_url(),
            login_dialog_url: default_login_dialog_url(),
            dialog_height_pct: DEFAULT_DIALOG_HEIGHT_PCT,
            dialog_width_pct: DEFAULT_DIALOG_WIDTH_PCT,
            token_cache_window_ms: DEFAULT_TOKEN_CACHE_WINDOW_MS,
            trial_poll_interval_ms: DEFAULT_TRIAL_POLL_INTERVAL_MS,
            fallback_scopes: default_fallback_scopes(),
            diagnostics_url: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(level) = env_non_empty("ADDIN_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = env_non_empty("ADDIN_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(url) = env_non_empty("ADDIN_LOGIN_DIALOG_URL") {
            self.login_dialog_url = url;
        }
        if let Some(url) = env_non_empty("ADDIN_DIAGNOSTICS_URL") {
            self.diagnostics_url = Some(url);
        }
    }

    /// Reject values the auth and license engines cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        self.backend_url()?;
        self.login_dialog_url()?;

        if self.token_cache_window_ms == 0 {
            return Err(CoreError::Config(
                "token_cache_window_ms must be greater than zero".to_string(),
            ));
        }
        if self.trial_poll_interval_ms == 0 {
            return Err(CoreError::Config(
                "trial_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        for (name, pct) in [
            ("dialog_height_pct", self.dialog_height_pct),
            ("dialog_width_pct", self.dialog_width_pct),
        ] {
            if pct == 0 || pct > 100 {
                return Err(CoreError::Config(format!(
                    "{} must be between 1 and 100, got {}",
                    name, pct
                )));
            }
        }
        Ok(())
    }

    /// Get the backend URL as a parsed URL.
    pub fn backend_url(&self) -> CoreResult<Url> {
        Url::parse(&self.backend_url).map_err(CoreError::from)
    }

    /// Get the login dialog URL as a parsed URL.
    pub fn login_dialog_url(&self) -> CoreResult<Url> {
        Url::parse(&self.login_dialog_url).map_err(CoreError::from)
    }

    /// Origin (`scheme://host[:port]`) the login dialog posts messages from.
    pub fn login_origin(&self) -> CoreResult<String> {
        Ok(self.login_dialog_url()?.origin().ascii_serialization())
    }

    pub fn token_cache_window(&self) -> Duration {
        Duration::from_millis(self.token_cache_window_ms)
    }

    pub fn trial_poll_interval(&self) -> Duration {
        Duration::from_millis(self.trial_poll_interval_ms)
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
