//! File system paths for the add-in's local state.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the user's home directory.
const BASE_DIR_NAME: &str = ".addin";

/// Manages file system paths for the add-in.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for local state (~/.addin)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.addin`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.addin).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.addin/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the parent-local storage file (~/.addin/local-storage.json).
    pub fn local_storage_file(&self) -> PathBuf {
        self.base_dir.join("local-storage.json")
    }

    /// Get the logs directory (~/.addin/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSON-lines log file (~/.addin/logs/addin.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("addin.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_layout() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/addin-test"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/addin-test/config.json"));
        assert_eq!(
            paths.local_storage_file(),
            PathBuf::from("/tmp/addin-test/local-storage.json")
        );
        assert_eq!(paths.log_file(), PathBuf::from("/tmp/addin-test/logs/addin.jsonl"));
    }

    #[test]
    fn test_ensure_dirs_creates_logs_dir() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));
        paths.ensure_dirs().unwrap();
        assert!(paths.logs_dir().is_dir());
    }
}
