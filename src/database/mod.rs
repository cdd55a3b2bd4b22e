//! Realtime Database arrays
//!
//! - `priority.rs` - child ordering by `(priority, key)`
//! - `data_snapshot.rs` - immutable child snapshots
//! - `snapshot_list.rs` - sorted local list and the child-event reducer
//! - `source.rs` - `DatabaseQuery` and `DataSource` traits
//! - `firebase_array.rs` - single-source ordered mirror
//! - `index_array.rs` - index query joined with a data location
//! - `memory.rs` - in-memory sources

pub mod data_snapshot;
pub mod firebase_array;
pub mod index_array;
pub mod memory;
pub mod priority;
pub mod snapshot_list;
pub mod source;

// Re-export from data_snapshot module
pub use data_snapshot::DataSnapshot;

// Re-export from firebase_array module
pub use firebase_array::FirebaseArray;

// Re-export from index_array module
pub use index_array::{DefaultJoinResolver, FirebaseIndexArray, JoinResolver, KeyState};

// Re-export from memory module
pub use memory::{MemoryDataSource, MemoryQuery};

// Re-export from priority module
pub use priority::{compare, Priority};

// Re-export from snapshot_list module
pub use snapshot_list::{ChildEvent, SnapshotList};

// Re-export from source module
pub use source::{DataSource, DatabaseQuery, RemoteEvent};
