//! Runtime error types.

use addin_config_and_utils::CoreError;
use addin_storage::StorageError;
use auth_engine::AuthenticationError;
use license_engine::LicenseError;
use thiserror::Error;

/// Runtime error type.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    /// User-facing authentication error
    #[error(transparent)]
    Auth(#[from] AuthenticationError),

    /// Licensing error
    #[error("License error: {0}")]
    License(#[from] LicenseError),

    /// Local storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using RuntimeError.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
