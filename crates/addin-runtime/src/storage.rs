//! Local storage for hosts that do not provide their own.

use crate::RuntimeResult;
use addin_config_and_utils::Paths;
use addin_storage::{FileStorage, LocalStorage};
use std::sync::Arc;
use tracing::info;

/// Open the add-in's file-backed store under the data directory.
pub fn open_local_storage(paths: &Paths) -> RuntimeResult<Arc<dyn LocalStorage>> {
    let storage = FileStorage::open(paths.local_storage_file())?;
    info!(path = %storage.path().display(), "Using file-backed local storage");
    Ok(Arc::new(storage))
}
