//! Cache entry and the persisted cache document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single cached value with its timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key, unique within the cache namespace
    pub key: String,
    /// Opaque payload
    pub value: serde_json::Value,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
    /// When the entry stops being served; `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Whether the entry must be treated as a miss at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now >= expires)
    }
}

/// Everything one cache namespace persists, written as a single blob.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct CacheDocument {
    #[serde(default)]
    pub entries: BTreeMap<String, CacheEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn entry(expires_at: Option<DateTime<Utc>>) -> CacheEntry {
        CacheEntry {
            key: "surah:1".to_string(),
            value: json!({"name": "Al-Fatiha"}),
            stored_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn test_never_expires() {
        let now = Utc::now();
        assert!(!entry(None).is_expired(now + Duration::days(3650)));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let e = entry(Some(now));
        assert!(e.is_expired(now));
        assert!(!e.is_expired(now - Duration::milliseconds(1)));
    }

    #[test]
    fn test_document_tolerates_missing_entries_field() {
        let doc: CacheDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.entries.is_empty());
    }
}
