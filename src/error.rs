//! Error types for offsync.
//!
//! A cache miss is not represented here: reads return `Ok(None)` for absent
//! or expired keys. Everything in this enum is a real failure.

use thiserror::Error;

/// Errors produced by the cache, the sync queue and their storage.
#[derive(Error, Debug)]
pub enum OffsyncError {
    /// Durable storage could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A persisted blob exists but cannot be decoded.
    #[error("Corrupt data under '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value could not be parsed or serialized.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A queued operation failed while executing.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// No executor is registered for an operation kind.
    #[error("No executor registered for operation kind '{0}'")]
    UnknownOperation(String),

    /// Connectivity probing or transport setup failed.
    #[error("Network error: {0}")]
    Network(String),

    /// A requested item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The logging subscriber could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl OffsyncError {
    /// Shorthand for an execution failure.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// True for failures of the durable store, including undecodable blobs.
    ///
    /// Callers use this to tell "storage is broken" apart from a cache miss
    /// and decide whether to retry or fall back to a live fetch.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Corrupt { .. })
    }
}

impl From<serde_json::Error> for OffsyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_classification() {
        assert!(OffsyncError::Storage("disk full".to_string()).is_storage());
        assert!(OffsyncError::Corrupt {
            key: "cache:default".to_string(),
            message: "expected value".to_string(),
        }
        .is_storage());
        assert!(!OffsyncError::execution("timeout").is_storage());
        assert!(!OffsyncError::NotFound("k".to_string()).is_storage());
    }

    #[test]
    fn test_display() {
        let err = OffsyncError::UnknownOperation("http".to_string());
        assert_eq!(
            err.to_string(),
            "No executor registered for operation kind 'http'"
        );
    }

    #[test]
    fn test_from_serde_json() {
        let err: OffsyncError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, OffsyncError::Parse(_)));
    }
}
