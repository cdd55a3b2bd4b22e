//! Firestore QuerySnapshot and DocumentChange types

use super::document_snapshot::{DocumentSnapshot, SnapshotMetadata};

/// Result of a query at one point in time, with the changes since the
/// previous snapshot delivered to the same listener
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    /// Documents in query order
    pub documents: Vec<DocumentSnapshot>,

    /// Changes since the previous snapshot, in the order they apply
    pub changes: Vec<DocumentChange>,

    /// Snapshot metadata
    pub metadata: SnapshotMetadata,
}

impl QuerySnapshot {
    /// Check if the query result is empty
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Get the number of documents in the snapshot
    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

/// Document change type for snapshot listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentChangeType {
    /// Document was added
    Added,
    /// Document was modified
    Modified,
    /// Document was removed
    Removed,
}

/// A change to a document in a query snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    /// Type of change
    pub change_type: DocumentChangeType,

    /// The document after the change (before it, for removals)
    pub document: DocumentSnapshot,

    /// Index in the previous snapshot (None if added)
    pub old_index: Option<usize>,

    /// Index in the new snapshot (None if removed)
    pub new_index: Option<usize>,
}

impl DocumentChange {
    /// Document added at `index`
    pub fn added(document: DocumentSnapshot, index: usize) -> Self {
        Self {
            change_type: DocumentChangeType::Added,
            document,
            old_index: None,
            new_index: Some(index),
        }
    }

    /// Document modified, moving from `old_index` to `new_index`
    pub fn modified(document: DocumentSnapshot, old_index: usize, new_index: usize) -> Self {
        Self {
            change_type: DocumentChangeType::Modified,
            document,
            old_index: Some(old_index),
            new_index: Some(new_index),
        }
    }

    /// Document removed from `index`
    pub fn removed(document: DocumentSnapshot, index: usize) -> Self {
        Self {
            change_type: DocumentChangeType::Removed,
            document,
            old_index: Some(index),
            new_index: None,
        }
    }
}
