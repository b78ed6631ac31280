//! In-process [`KvStore`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::KvStore;
use crate::error::OffsyncError;

/// Shared in-memory store. Clones see the same data, which lets tests tear
/// down a cache or queue and rebuild it over the "same disk".
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, OffsyncError> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), OffsyncError> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, OffsyncError> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        value: &[u8],
    ) -> Result<bool, OffsyncError> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        if data.get(key) != expected.as_ref() {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_vec());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_data() {
        let store = MemoryStore::new();
        let other = store.clone();

        store.write("k", b"v").unwrap();
        assert_eq!(other.read("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(other.len(), 1);

        assert!(other.delete("k").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_compare_and_swap() {
        let store = MemoryStore::new();

        assert!(store.compare_and_swap("k", None, b"1").unwrap());
        assert!(!store.compare_and_swap("k", None, b"2").unwrap());
        assert!(!store.compare_and_swap("k", Some(b"0".to_vec()), b"2").unwrap());
        assert!(store.compare_and_swap("k", Some(b"1".to_vec()), b"2").unwrap());
        assert_eq!(store.read("k").unwrap(), Some(b"2".to_vec()));
    }
}
