//! `SQLite` database connection implementing [`KvStore`].
//!
//! The database is stored at `~/.offsync/offsync.db`. Each component owns a
//! single row of the `kv_store` table.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{migrations, KvStore};
use crate::error::OffsyncError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const UPSERT: &str = r"INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

/// Database connection wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at a specific path.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &Path) -> Result<Self, OffsyncError> {
        let conn = Connection::open(path).map_err(|e| {
            OffsyncError::Storage(format!("Failed to open database {}: {e}", path.display()))
        })?;

        // Full sync so a committed write survives power loss.
        conn.execute_batch("PRAGMA synchronous = FULL;")
            .map_err(|e| OffsyncError::Storage(format!("Failed to configure database: {e}")))?;
        // Another process may hold the write lock for a compare-and-swap.
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| OffsyncError::Storage(format!("Failed to configure database: {e}")))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, OffsyncError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            OffsyncError::Storage(format!("Failed to open in-memory database: {e}"))
        })?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, OffsyncError> {
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, OffsyncError> {
        migrations::get_version(&self.connection())
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvStore for Database {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, OffsyncError> {
        self.connection()
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| OffsyncError::Storage(format!("Failed to read '{key}': {e}")))
    }

    fn write(&self, key: &str, value: &[u8]) -> Result<(), OffsyncError> {
        self.connection()
            .execute(UPSERT, params![key, value, Utc::now().to_rfc3339()])
            .map_err(|e| OffsyncError::Storage(format!("Failed to write '{key}': {e}")))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, OffsyncError> {
        let rows = self
            .connection()
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .map_err(|e| OffsyncError::Storage(format!("Failed to delete '{key}': {e}")))?;
        Ok(rows > 0)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Vec<u8>>,
        value: &[u8],
    ) -> Result<bool, OffsyncError> {
        let storage_err = |e: rusqlite::Error| {
            OffsyncError::Storage(format!("Failed to swap '{key}': {e}"))
        };

        let mut conn = self.connection();
        // IMMEDIATE takes the write lock up front, so no other connection
        // can change the row between the read and the write.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(storage_err)?;

        let current: Option<Vec<u8>> = tx
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;
        if current != expected {
            return Ok(false);
        }

        tx.execute(UPSERT, params![key, value, Utc::now().to_rfc3339()])
            .map_err(storage_err)?;
        tx.commit().map_err(storage_err)?;
        Ok(true)
    }
}
