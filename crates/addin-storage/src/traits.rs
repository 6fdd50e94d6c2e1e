//! Storage trait definitions.

use crate::StorageResult;

/// Parent-local persistent key/value storage.
///
/// Writes are last-writer-wins; there is no conflict detection.
pub trait LocalStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// List all keys that start with a given prefix, sorted.
    fn list_keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Key/value pairs for every key under `prefix`, sorted by key.
    fn entries_with_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for key in self.list_keys_with_prefix(prefix)? {
            if let Some(value) = self.get(&key)? {
                entries.push((key, value));
            }
        }
        Ok(entries)
    }
}
