//! Cloud Firestore arrays
//!
//! - `document_snapshot.rs` - documents and snapshot metadata
//! - `query_snapshot.rs` - query results and document changes
//! - `source.rs` - `FirestoreQuery`, `MetadataChanges`, `SnapshotFeed`
//! - `firestore_array.rs` - ordered mirror driven by server-side indices

pub mod document_snapshot;
pub mod firestore_array;
pub mod query_snapshot;
pub mod source;

// Re-export from document_snapshot module
pub use document_snapshot::{DocumentSnapshot, SnapshotMetadata};

// Re-export from firestore_array module
pub use firestore_array::FirestoreArray;

// Re-export from query_snapshot module
pub use query_snapshot::{DocumentChange, DocumentChangeType, QuerySnapshot};

// Re-export from source module
pub use source::{FirestoreQuery, MetadataChanges, SnapshotFeed, SnapshotResult};
