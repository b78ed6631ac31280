//! Configuration management for offsync.
//!
//! This module handles loading and saving configuration from the data root
//! (`$OFFSYNC_HOME` or `~/.offsync/`).

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{
    CacheConfig, Config, LoggingConfig, NetworkConfig, StorageBackend, StorageConfig, SyncConfig,
};
