//! Live Firestore queries consumed by [`FirestoreArray`](super::FirestoreArray)

use super::query_snapshot::QuerySnapshot;
use crate::common::{lock, EventSink, ListenerRegistration};
use crate::error::FirestoreError;
use std::sync::Mutex;

/// Controls whether metadata-only changes trigger snapshot events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetadataChanges {
    /// Deliver a snapshot when only the metadata changed
    Include,

    /// Deliver a snapshot only when documents changed
    #[default]
    Exclude,
}

/// Snapshot, or the error that ended the listener
pub type SnapshotResult = Result<QuerySnapshot, FirestoreError>;

/// A live query whose results arrive as [`QuerySnapshot`]s
pub trait FirestoreQuery: Send + Sync {
    /// Attach a snapshot listener that feeds `sink`
    ///
    /// The first snapshot lists every matching document as `Added`. An
    /// `Err` ends the listener.
    fn add_snapshot_listener(
        &self,
        metadata_changes: MetadataChanges,
        sink: EventSink<SnapshotResult>,
    ) -> Result<ListenerRegistration, FirestoreError>;

    /// Detach a snapshot listener. Unknown registrations are ignored.
    fn remove(&self, registration: ListenerRegistration);
}

#[derive(Default)]
struct FeedState {
    subscribers: Vec<(ListenerRegistration, MetadataChanges, EventSink<SnapshotResult>)>,
    next_id: u64,
}

/// Query whose snapshots are pushed by hand
///
/// Useful in tests, demos, and for bridging a listener API that already
/// produces [`QuerySnapshot`]s.
#[derive(Default)]
pub struct SnapshotFeed {
    state: Mutex<FeedState>,
}

impl SnapshotFeed {
    /// Create a feed with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a snapshot to every listener
    ///
    /// A snapshot without document changes only reaches listeners that
    /// asked for [`MetadataChanges::Include`].
    pub fn push(&self, snapshot: QuerySnapshot) {
        let metadata_only = snapshot.changes.is_empty();
        lock(&self.state).subscribers.retain(|(_, metadata_changes, sink)| {
            if metadata_only && *metadata_changes == MetadataChanges::Exclude {
                return true;
            }
            sink.send(Ok(snapshot.clone()))
        });
    }

    /// End every listener with `error`
    pub fn fail(&self, error: FirestoreError) {
        for (_, _, sink) in lock(&self.state).subscribers.drain(..) {
            sink.send(Err(error.clone()));
        }
    }

    /// Number of attached listeners
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }
}

impl FirestoreQuery for SnapshotFeed {
    fn add_snapshot_listener(
        &self,
        metadata_changes: MetadataChanges,
        sink: EventSink<SnapshotResult>,
    ) -> Result<ListenerRegistration, FirestoreError> {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let registration = ListenerRegistration::new(state.next_id);
        state.subscribers.push((registration, metadata_changes, sink));
        Ok(registration)
    }

    fn remove(&self, registration: ListenerRegistration) {
        lock(&self.state)
            .subscribers
            .retain(|(id, _, _)| *id != registration);
    }
}
