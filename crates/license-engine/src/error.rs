//! Licensing error types.

use thiserror::Error;

/// Shown when the backend does not know the submitted key.
pub const INVALID_LICENSE_KEY_MESSAGE: &str = "Invalid license key. Please try again.";

/// Shown for every other activation failure.
pub const ACTIVATION_RETRY_MESSAGE: &str =
    "We couldn't activate your license right now. Please try again.";

/// Shown when the submitted key is blank.
pub const EMPTY_LICENSE_KEY_MESSAGE: &str = "Please enter a license key.";

const LICENSE_NOT_FOUND: &str = "license not found";

/// Licensing error type.
#[derive(Error, Debug)]
pub enum LicenseError {
    /// Entitlement requested before any identity exists
    #[error("Not signed in")]
    NotSignedIn,

    /// Access token for the licensing backend could not be obtained
    #[error("Access token unavailable: {0}")]
    Token(String),

    /// License key was empty after trimming
    #[error("License key is empty")]
    EmptyLicenseKey,

    /// Non-success response from the licensing backend
    #[error("Licensing API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl LicenseError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - HTTP errors with 5xx status codes
    pub fn is_transient(&self) -> bool {
        match self {
            LicenseError::Api { status, .. } => (500..600).contains(status),
            LicenseError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }

    /// Whether the backend rejected the key as unknown.
    pub fn is_license_not_found(&self) -> bool {
        match self {
            LicenseError::Api { message, .. } => {
                message.to_lowercase().contains(LICENSE_NOT_FOUND)
            }
            _ => false,
        }
    }

    /// Message to show next to the activation form.
    pub fn user_message(&self) -> &'static str {
        if self.is_license_not_found() {
            INVALID_LICENSE_KEY_MESSAGE
        } else if matches!(self, LicenseError::EmptyLicenseKey) {
            EMPTY_LICENSE_KEY_MESSAGE
        } else {
            ACTIVATION_RETRY_MESSAGE
        }
    }

    /// Failures the user caused and can fix without anyone else knowing.
    pub(crate) fn is_user_input(&self) -> bool {
        self.is_license_not_found() || matches!(self, LicenseError::EmptyLicenseKey)
    }
}

/// Result type alias using LicenseError.
pub type LicenseResult<T> = Result<T, LicenseError>;
