//! Firebase UI arrays for Rust
//!
//! Observable, ordered local mirrors of Firebase collections, built to back
//! list views. An array listens to a remote query, keeps its children
//! sorted, and tells its listeners exactly which position was added,
//! changed, removed or moved.
//!
//! - [`FirebaseArray`] mirrors a Realtime Database query, ordered by
//!   `(priority, key)`
//! - [`FirebaseIndexArray`] follows the order of an index query and fills
//!   each position from a separate data location
//! - [`FirestoreArray`] mirrors a Firestore query using server-side indices
//!
//! # Example
//! ```
//! use firebase_ui_rust::database::{FirebaseArray, MemoryQuery};
//! use firebase_ui_rust::{ArrayEvent, ObservableSnapshotArray};
//! use futures::StreamExt;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let query = Arc::new(MemoryQuery::new());
//! let array = FirebaseArray::new(query.clone());
//! let mut changes = array.changes();
//!
//! array.start()?;
//! query.set("k1", 1, json!({ "text": "first" }));
//!
//! while let Some(event) = changes.next().await {
//!     if let ArrayEvent::Child(change) = event {
//!         println!("{:?} {}", change.event_type, change.snapshot.key());
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod common;
pub mod database;
pub mod error;
pub mod firestore;

// Re-exports for convenience
pub use error::{ArrayError, DatabaseError, FirebaseUiError, FirestoreError, RemoteError};

// Common re-exports
pub use common::{
    ArrayEvent, ArraySettings, ChangeEvent, ChangeEventListener, ChangeEventStream,
    ChangeEventType, ListenerHandle, ObservableSnapshotArray,
};

// Database re-exports
pub use database::{DataSnapshot, FirebaseArray, FirebaseIndexArray, Priority};

// Firestore re-exports
pub use firestore::{DocumentSnapshot, FirestoreArray};
