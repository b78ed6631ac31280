//! JSON output formatting for offsync.

use serde::Serialize;
use serde_json::json;

use crate::cache::CacheEntry;
use crate::error::OffsyncError;
use crate::sync::{DrainStatus, QueuedOperation};

/// Format a single cache entry as JSON
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_entry_json(entry: &CacheEntry) -> Result<String, OffsyncError> {
    Ok(serde_json::to_string_pretty(entry)?)
}

/// Format cache entries as JSON
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_entries_json(entries: &[CacheEntry]) -> Result<String, OffsyncError> {
    let output = json!({
        "count": entries.len(),
        "items": entries
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format queued operations as JSON
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_operations_json(operations: &[QueuedOperation]) -> Result<String, OffsyncError> {
    let output = json!({
        "count": operations.len(),
        "items": operations
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a drain outcome as JSON
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn format_drain_status_json(status: &DrainStatus) -> Result<String, OffsyncError> {
    let output = match status {
        DrainStatus::Offline => json!({"status": "offline"}),
        DrainStatus::AlreadyDraining => json!({"status": "already_draining"}),
        DrainStatus::Idle => json!({"status": "idle"}),
        DrainStatus::Ran(report) => json!({"status": "ran", "report": report}),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `OffsyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, OffsyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::DrainReport;
    use chrono::Utc;

    #[test]
    fn test_format_entries_json() {
        let entries = vec![CacheEntry {
            key: "k".to_string(),
            value: json!([1, 2]),
            stored_at: Utc::now(),
            expires_at: None,
        }];

        let output = format_entries_json(&entries).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["items"][0]["key"], "k");
        assert_eq!(parsed["items"][0]["value"], json!([1, 2]));
        assert!(parsed["items"][0]["expires_at"].is_null());
    }

    #[test]
    fn test_format_drain_status_json() {
        let offline: serde_json::Value =
            serde_json::from_str(&format_drain_status_json(&DrainStatus::Offline).unwrap())
                .unwrap();
        assert_eq!(offline["status"], "offline");

        let ran = DrainStatus::Ran(DrainReport {
            attempted: 2,
            succeeded: 2,
            ..DrainReport::default()
        });
        let parsed: serde_json::Value =
            serde_json::from_str(&format_drain_status_json(&ran).unwrap()).unwrap();
        assert_eq!(parsed["status"], "ran");
        assert_eq!(parsed["report"]["succeeded"], 2);
        assert_eq!(parsed["report"]["dropped"], json!([]));
    }

    #[test]
    fn test_format_operations_json_empty() {
        let output = format_operations_json(&[]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["count"], 0);
    }
}
