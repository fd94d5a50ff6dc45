//! In-memory key-value store backed by a `HashMap` behind a `Mutex`.

use linglear_types::{KeyValueStore, Result};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// An in-memory [`KeyValueStore`] for tests and transient per-run state.
pub struct InMemoryStore {
    data: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let store = InMemoryStore::new();
        store.set("linglear_access_token", "tok").unwrap();
        assert_eq!(
            store.get("linglear_access_token").unwrap().as_deref(),
            Some("tok")
        );
    }

    #[test]
    fn test_get_missing() {
        let store = InMemoryStore::new();
        assert!(store.get("nope").unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let store = InMemoryStore::new();
        store.set("k", "first").unwrap();
        store.set("k", "second").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("second"));
        assert_eq!(store.len(), 1);
        store.remove("k").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }
}
