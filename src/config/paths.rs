//! Path resolution for offsync configuration and data files.
//!
//! All offsync data is stored under `$OFFSYNC_HOME`, or `~/.offsync/` when
//! that is unset:
//! - `config.yaml` - Main configuration file
//! - `offsync.db` - SQLite store for the cache and sync queue
//! - `store/` - One-file-per-key store used by the `file` backend

use std::path::PathBuf;

use crate::error::OffsyncError;

/// Environment variable overriding the data root.
pub const HOME_ENV: &str = "OFFSYNC_HOME";

/// Paths to offsync configuration and data.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.offsync/`
    pub root: PathBuf,
    /// Config file: `~/.offsync/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.offsync/offsync.db`
    pub database: PathBuf,
    /// File store directory: `~/.offsync/store/`
    pub store: PathBuf,
}

impl Paths {
    /// Resolve paths from `$OFFSYNC_HOME` or the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, OffsyncError> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME").map_err(|_| {
            OffsyncError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_root(PathBuf::from(home).join(".offsync")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("offsync.db"),
            store: root.join("store"),
            root,
        }
    }

    /// Ensure all directories exist, creating them if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure_dirs(&self) -> Result<(), OffsyncError> {
        for dir in [&self.root, &self.store] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    OffsyncError::Config(format!(
                        "Failed to create directory {}: {e}",
                        dir.display()
                    ))
                })?;
            }
        }

        Ok(())
    }
}
