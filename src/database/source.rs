//! Remote sources consumed by the database arrays
//!
//! A binding to a Realtime Database SDK implements [`DatabaseQuery`] for
//! live child events and [`DataSource`] for one-shot reads.
//! [`memory`](super::memory) provides in-process implementations.

use super::data_snapshot::DataSnapshot;
use super::snapshot_list::ChildEvent;
use crate::common::{EventSink, ListenerRegistration};
use crate::error::DatabaseError;
use futures::future::BoxFuture;

/// Event delivered by a live query listener
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// A child-level change
    Child(ChildEvent),
    /// The query's value event fired: the initial load, or a batch of
    /// changes, has been fully delivered
    Synced,
    /// The listener was cancelled by the server
    Cancelled(DatabaseError),
}

/// A live, ordered query over the children of a location
pub trait DatabaseQuery: Send + Sync {
    /// Attach a listener that feeds `sink`
    ///
    /// Existing children are delivered as `Child(Added)` events followed by
    /// `Synced`. Events must be sent in the order the server produced them.
    fn listen(&self, sink: EventSink<RemoteEvent>) -> Result<ListenerRegistration, DatabaseError>;

    /// Detach a listener. Unknown registrations are ignored.
    fn unlisten(&self, registration: ListenerRegistration);
}

/// One-shot reads of a child by key
pub trait DataSource: Send + Sync {
    /// Read the child at `key` once
    ///
    /// Resolves to `Ok(None)` when the key holds no data.
    fn fetch_once(&self, key: &str) -> BoxFuture<'static, Result<Option<DataSnapshot>, DatabaseError>>;
}
