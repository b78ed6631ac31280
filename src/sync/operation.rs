//! Queued operations and the persisted queue document.
//!
//! An operation is a tagged command: a `kind` naming the executor that will
//! run it, plus a JSON payload. Nothing executable is stored, so the queue
//! survives a process restart.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A typed command that can be queued and executed later.
///
/// `KIND` ties the payload type to its executor in the
/// [`ExecutorRegistry`](super::ExecutorRegistry).
pub trait Command: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Operation kind stored with every queued instance.
    const KIND: &'static str;
}

/// A deferred mutation waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Monotonic id, unique within the queue
    pub id: u64,
    /// Executor kind
    pub kind: String,
    /// Command payload
    pub payload: serde_json::Value,
    /// When the operation was enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Failed attempts so far
    #[serde(default)]
    pub attempts: u32,
    /// When the last failed attempt ran
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    /// Message from the last failed attempt
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueuedOperation {
    /// Decode the payload into a typed command.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the payload does not match `C`.
    pub fn decode<C: Command>(&self) -> Result<C, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Record a failed attempt.
    pub(crate) fn record_failure(&mut self, at: DateTime<Utc>, error: String) {
        self.attempts += 1;
        self.last_attempt = Some(at);
        self.last_error = Some(error);
    }
}

/// Everything one queue namespace persists, written as a single blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct QueueDocument {
    #[serde(default)]
    pub next_id: u64,
    #[serde(default)]
    pub operations: Vec<QueuedOperation>,
}

impl QueueDocument {
    /// Append an operation and return its id.
    pub fn push(
        &mut self,
        kind: String,
        payload: serde_json::Value,
        enqueued_at: DateTime<Utc>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.operations.push(QueuedOperation {
            id,
            kind,
            payload,
            enqueued_at,
            attempts: 0,
            last_attempt: None,
            last_error: None,
        });
        id
    }

    /// Keep `next_id` ahead of every stored id.
    pub fn repair_next_id(&mut self) {
        if let Some(max) = self.operations.iter().map(|op| op.id).max() {
            self.next_id = self.next_id.max(max.saturating_add(1));
        }
    }

    /// Position of the operation with `id`.
    pub fn position(&self, id: u64) -> Option<usize> {
        self.operations.iter().position(|op| op.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct MarkRead {
        ayah: u32,
    }

    impl Command for MarkRead {
        const KIND: &'static str = "mark_read";
    }

    #[test]
    fn test_push_assigns_monotonic_ids() {
        let mut doc = QueueDocument::default();
        let a = doc.push("a".to_string(), json!(null), Utc::now());
        let b = doc.push("b".to_string(), json!(null), Utc::now());
        assert_eq!((a, b), (0, 1));

        doc.operations.remove(0);
        let c = doc.push("c".to_string(), json!(null), Utc::now());
        assert_eq!(c, 2);
        assert_eq!(doc.position(2), Some(1));
        assert_eq!(doc.position(0), None);
    }

    #[test]
    fn test_decode_typed_payload() {
        let mut doc = QueueDocument::default();
        doc.push(MarkRead::KIND.to_string(), json!({"ayah": 7}), Utc::now());
        let decoded: MarkRead = doc.operations[0].decode().unwrap();
        assert_eq!(decoded, MarkRead { ayah: 7 });
    }

    #[test]
    fn test_decode_mismatched_payload_fails() {
        let mut doc = QueueDocument::default();
        doc.push(MarkRead::KIND.to_string(), json!({"page": 2}), Utc::now());
        assert!(doc.operations[0].decode::<MarkRead>().is_err());
    }

    #[test]
    fn test_record_failure() {
        let mut doc = QueueDocument::default();
        doc.push("x".to_string(), json!(1), Utc::now());
        let op = &mut doc.operations[0];
        let at = Utc::now();
        op.record_failure(at, "timeout".to_string());
        assert_eq!(op.attempts, 1);
        assert_eq!(op.last_attempt, Some(at));
        assert_eq!(op.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_document_defaults_for_older_blobs() {
        let mut doc: QueueDocument = serde_json::from_str(
            r#"{"operations":[{"id":4,"kind":"x","payload":null,"enqueued_at":"2024-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.next_id, 0);
        assert_eq!(doc.operations[0].attempts, 0);

        doc.repair_next_id();
        assert_eq!(doc.next_id, 5);
    }
}
