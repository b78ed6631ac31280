//! Configuration settings for offsync.
//!
//! Settings are loaded from `config.yaml` under the data root. Every field
//! has a default, so partial files are fine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Paths;
use crate::error::OffsyncError;
use crate::sync::QueueOptions;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Durable storage settings.
    pub storage: StorageConfig,
    /// Cache settings.
    pub cache: CacheConfig,
    /// Sync queue settings.
    pub sync: SyncConfig,
    /// Connectivity probe settings.
    pub network: NetworkConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Which durable store backs the cache and queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database file.
    #[default]
    Sqlite,
    /// One JSON file per key.
    File,
}

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend.
    pub backend: StorageBackend,
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// TTL applied when `set` is called without one.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
}

/// Sync queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Queue namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Failed attempts before an operation is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Timeout for queued HTTP requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Connectivity probe settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// `host:port` the probe connects to.
    #[serde(default = "default_probe_target")]
    pub probe_target: String,
    /// Seconds between probes.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    /// Seconds before a probe counts as failed.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `OFFSYNC_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of text.
    #[serde(default)]
    pub json: bool,
}

// Default value functions for serde
fn default_namespace() -> String {
    "default".to_string()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_request_timeout() -> u64 {
    30
}

fn default_probe_target() -> String {
    "1.1.1.1:443".to_string()
}

const fn default_probe_interval() -> u64 {
    15
}

const fn default_probe_timeout() -> u64 {
    3
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            default_ttl_secs: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_target: default_probe_target(),
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl CacheConfig {
    /// Default TTL as a duration.
    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }
}

impl SyncConfig {
    /// Queue tunables.
    #[must_use]
    pub const fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            max_attempts: self.max_attempts,
        }
    }

    /// HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl NetworkConfig {
    /// Probe interval.
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Probe timeout.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, OffsyncError> {
        let paths = Paths::new()?;
        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// holds invalid values.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, OffsyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            OffsyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            OffsyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), OffsyncError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| OffsyncError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            OffsyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Reject values the components cannot work with.
    ///
    /// # Errors
    ///
    /// Returns a config error naming the first invalid field.
    pub fn validate(&self) -> Result<(), OffsyncError> {
        if self.sync.max_attempts == 0 {
            return Err(OffsyncError::Config(
                "sync.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.cache.namespace.is_empty() || self.sync.namespace.is_empty() {
            return Err(OffsyncError::Config(
                "cache.namespace and sync.namespace must not be empty".to_string(),
            ));
        }
        if self.cache.default_ttl_secs == Some(0) {
            return Err(OffsyncError::Config(
                "cache.default_ttl_secs must be at least 1; omit it for no expiry".to_string(),
            ));
        }
        if self.network.probe_interval_secs == 0 {
            return Err(OffsyncError::Config(
                "network.probe_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
