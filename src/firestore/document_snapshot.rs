//! Firestore document snapshots and their metadata

use crate::common::KeyedSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable copy of a document in a query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Document ID
    pub id: String,

    /// Document fields (None if the document doesn't exist)
    #[serde(default)]
    pub data: Option<Value>,

    /// Document metadata
    #[serde(default)]
    pub metadata: SnapshotMetadata,
}

impl DocumentSnapshot {
    /// Snapshot of an existing document
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data: Some(data),
            metadata: SnapshotMetadata::default(),
        }
    }

    /// Snapshot of a document that does not exist
    pub fn missing(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
            metadata: SnapshotMetadata::default(),
        }
    }

    /// Document ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check if the document exists
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    /// Get a top-level field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.as_ref()?.get(field)
    }

    /// Same snapshot with different metadata
    pub fn with_metadata(self, metadata: SnapshotMetadata) -> Self {
        Self { metadata, ..self }
    }
}

impl KeyedSnapshot for DocumentSnapshot {
    fn key(&self) -> &str {
        &self.id
    }

    fn json_value(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

/// Metadata about a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Whether the snapshot contains local writes not yet committed
    pub has_pending_writes: bool,

    /// Whether the data came from the local cache
    pub is_from_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_default() {
        let metadata = SnapshotMetadata::default();
        assert!(!metadata.has_pending_writes);
        assert!(!metadata.is_from_cache);
    }

    #[test]
    fn test_get_field() {
        let snapshot = DocumentSnapshot::new("d1", json!({ "title": "Hello" }));
        assert!(snapshot.exists());
        assert_eq!(snapshot.get("title"), Some(&json!("Hello")));
        assert_eq!(snapshot.get("missing"), None);
        assert_eq!(DocumentSnapshot::missing("d2").get("title"), None);
    }

    #[test]
    fn test_with_metadata() {
        let snapshot = DocumentSnapshot::new("d1", json!({})).with_metadata(SnapshotMetadata {
            has_pending_writes: true,
            is_from_cache: false,
        });
        assert!(snapshot.metadata.has_pending_writes);
        assert_eq!(KeyedSnapshot::key(&snapshot), "d1");
    }
}
