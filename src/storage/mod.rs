//! Durable storage boundary for offsync.
//!
//! The cache and the sync queue each persist one blob through [`KvStore`].
//! Three backends are provided:
//! - [`Database`]: `SQLite` table, the default
//! - [`FileStore`]: one file per key with atomic replace
//! - [`MemoryStore`]: shared in-process map, for tests and ephemeral use

mod database;
mod file;
mod memory;
mod migrations;

pub use database::Database;
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::OffsyncError;

/// A byte-oriented key-value store with synchronous durability.
///
/// `write` must not return `Ok` until the bytes would survive a process
/// crash. All failures are reported as [`OffsyncError::Storage`].
#[cfg_attr(test, mockall::automock)]
pub trait KvStore: Send + Sync {
    /// Read the bytes stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, OffsyncError>;

    /// Replace the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the bytes cannot be persisted.
    fn write(&self, key: &str, value: &[u8]) -> Result<(), OffsyncError>;

    /// Remove `key`. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be modified.
    fn delete(&self, key: &str) -> Result<bool, OffsyncError>;

    /// Replace the bytes under `key` only if they still equal `expected`
    /// (`None` meaning the key is absent). Returns whether the swap happened.
    ///
    /// The comparison and the write are atomic with respect to every other
    /// writer of the same store, including other processes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read or written.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        value: &[u8],
    ) -> Result<bool, OffsyncError>;
}
