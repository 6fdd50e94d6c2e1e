//! In-memory storage backend.

use crate::{LocalStorage, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Process-local storage backed by a sorted map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    fn list_keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageKeys;

    #[test]
    fn test_set_get_delete() {
        let storage = MemoryStorage::new();
        storage.set("key", "value").unwrap();
        assert_eq!(storage.get("key").unwrap(), Some("value".to_string()));
        assert!(storage.has("key").unwrap());

        assert!(storage.delete("key").unwrap());
        assert!(!storage.delete("key").unwrap());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_last_writer_wins() {
        let storage = MemoryStorage::new();
        storage.set("key", "first").unwrap();
        storage.set("key", "second").unwrap();
        assert_eq!(storage.get("key").unwrap(), Some("second".to_string()));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_entries_with_prefix_filters_and_sorts() {
        let storage = MemoryStorage::new();
        storage.set("idp.b", "2").unwrap();
        storage.set("other", "x").unwrap();
        storage.set("idp.a", "1").unwrap();

        let entries = storage
            .entries_with_prefix(StorageKeys::IDENTITY_CACHE_PREFIX)
            .unwrap();
        assert_eq!(
            entries,
            vec![
                ("idp.a".to_string(), "1".to_string()),
                ("idp.b".to_string(), "2".to_string()),
            ]
        );
    }
}
