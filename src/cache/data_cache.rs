//! Durable key-value cache with per-entry expiry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::entry::{CacheDocument, CacheEntry};
use crate::clock::{Clock, SystemClock};
use crate::error::OffsyncError;
use crate::storage::KvStore;

/// Read-through cache persisted as one blob per namespace.
///
/// Every mutating call is a full read-modify-write of the blob and returns
/// only after the store has accepted the new document. Expired entries are
/// evicted lazily when a read finds them; there is no background sweeper.
pub struct DataCache {
    store: Arc<dyn KvStore>,
    namespace: String,
    blob_key: String,
    clock: Arc<dyn Clock>,
    default_ttl: Option<Duration>,
    write_lock: Mutex<()>,
}

impl DataCache {
    /// Create a cache over `store` for the given namespace.
    pub fn new(store: Arc<dyn KvStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            blob_key: format!("cache:{namespace}"),
            clock: Arc::new(SystemClock),
            default_ttl: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Use a different time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// TTL applied by [`DataCache::set`] when the caller passes none.
    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// The namespace this cache writes to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get a value, or `None` on a miss.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the blob cannot be read or rewritten, and a
    /// parse error if the cached value does not decode into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, OffsyncError> {
        match self.get_entry(key)? {
            Some(entry) => Ok(Some(serde_json::from_value(entry.value)?)),
            None => Ok(None),
        }
    }

    /// Get an entry with its timestamps, or `None` on a miss.
    ///
    /// An expired entry is removed from the persisted blob before the miss
    /// is returned, so it can never be served again.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the blob cannot be read or rewritten.
    pub fn get_entry(&self, key: &str) -> Result<Option<CacheEntry>, OffsyncError> {
        let _guard = self.lock();
        let mut doc = self.load()?;

        let Some(entry) = doc.entries.get(key) else {
            debug!(namespace = %self.namespace, key, "cache miss");
            return Ok(None);
        };

        if !entry.is_expired(self.clock.now()) {
            return Ok(Some(entry.clone()));
        }

        doc.entries.remove(key);
        self.save(&doc)?;
        debug!(namespace = %self.namespace, key, "evicted expired entry");
        Ok(None)
    }

    /// Store a value, replacing any entry under `key`.
    ///
    /// `ttl` falls back to the cache's default TTL. A zero TTL is stored as
    /// already expired, so the entry is never returned by [`DataCache::get`].
    ///
    /// # Errors
    ///
    /// Returns a storage error if the blob cannot be persisted. The write is
    /// durable once this returns `Ok`.
    pub fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), OffsyncError> {
        let value = serde_json::to_value(value)?;

        let _guard = self.lock();
        let mut doc = self.load()?;
        let now = self.clock.now();
        let expires_at = ttl.or(self.default_ttl).and_then(|ttl| expiry_after(now, ttl));

        doc.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                stored_at: now,
                expires_at,
            },
        );
        self.save(&doc)?;

        debug!(namespace = %self.namespace, key, expires_at = ?expires_at, "cache set");
        Ok(())
    }

    /// Remove one entry. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the blob cannot be read or rewritten.
    pub fn clear(&self, key: &str) -> Result<bool, OffsyncError> {
        let _guard = self.lock();
        let mut doc = self.load()?;

        if doc.entries.remove(key).is_none() {
            return Ok(false);
        }

        self.save(&doc)?;
        Ok(true)
    }

    /// Remove every entry in the namespace by deleting its blob.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the blob cannot be deleted.
    pub fn clear_all(&self) -> Result<(), OffsyncError> {
        let _guard = self.lock();
        self.store.delete(&self.blob_key)?;
        debug!(namespace = %self.namespace, "cache cleared");
        Ok(())
    }

    /// All live entries, sorted by key. Does not evict.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the blob cannot be read.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, OffsyncError> {
        let _guard = self.lock();
        let now = self.clock.now();

        Ok(self
            .load()?
            .entries
            .into_values()
            .filter(|entry| !entry.is_expired(now))
            .collect())
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Result<CacheDocument, OffsyncError> {
        match self.store.read(&self.blob_key)? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| OffsyncError::Corrupt {
                key: self.blob_key.clone(),
                message: e.to_string(),
            }),
            None => Ok(CacheDocument::default()),
        }
    }

    fn save(&self, doc: &CacheDocument) -> Result<(), OffsyncError> {
        let bytes = serde_json::to_vec(doc)?;
        self.store.write(&self.blob_key, &bytes)
    }
}

/// `now + ttl`, or `None` when the sum falls off the calendar.
fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
}
