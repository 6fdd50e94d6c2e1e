//! Parent-local persistent storage for the add-in.
//!
//! The identity-provider client keeps its account cache here. When the login
//! dialog runs with storage isolated from the task pane, its cache entries are
//! replayed into this store so the task pane can rehydrate.
//!
//! Backends:
//! - [`MemoryStorage`]: process-local, used by tests and ephemeral hosts
//! - [`FileStorage`]: a JSON object on disk

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::LocalStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
