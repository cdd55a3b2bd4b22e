//! Ordered, observable mirror of a Firestore query
//!
//! Firestore computes positions on the server: every [`DocumentChange`]
//! carries the old and new index of its document. [`FirestoreArray`]
//! replays those changes onto a local list and reports each one as a
//! [`ChangeEvent`], with `on_data_changed` after every snapshot.

use super::document_snapshot::DocumentSnapshot;
use super::query_snapshot::{DocumentChange, DocumentChangeType, QuerySnapshot};
use super::source::{FirestoreQuery, MetadataChanges, SnapshotResult};
use crate::common::dispatch::DispatchQueue;
use crate::common::listener::ListenerRegistry;
use crate::common::{
    lock, ChangeEvent, ChangeEventListener, EventSink, ListenerHandle, ListenerRegistration,
    ObservableSnapshotArray,
};
use crate::error::{ArrayError, FirestoreError};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, trace, warn};

struct Session {
    generation: u64,
    queue: DispatchQueue,
    registration: Option<ListenerRegistration>,
    cancelled: bool,
}

#[derive(Default)]
struct ArrayState {
    documents: Vec<DocumentSnapshot>,
    session: Option<Session>,
    generation: u64,
    has_data_changed: bool,
}

impl ArrayState {
    fn is_live(&self, generation: u64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.generation == generation && !session.cancelled)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|document| document.id() == id)
    }

    fn holds_at(&self, index: usize, id: &str) -> bool {
        self.documents
            .get(index)
            .is_some_and(|document| document.id() == id)
    }

    /// Apply one server-side change, or `None` if it contradicts the local list
    fn apply(&mut self, change: DocumentChange) -> Option<ChangeEvent<DocumentSnapshot>> {
        let id = change.document.id().to_string();
        match (change.change_type, change.old_index, change.new_index) {
            (DocumentChangeType::Added, _, Some(new)) => {
                if new > self.documents.len() || self.position(&id).is_some() {
                    return None;
                }
                self.documents.insert(new, change.document.clone());
                Some(ChangeEvent::added(change.document, new))
            }
            (DocumentChangeType::Removed, Some(old), _) => {
                if !self.holds_at(old, &id) {
                    return None;
                }
                let removed = self.documents.remove(old);
                Some(ChangeEvent::removed(removed, old))
            }
            (DocumentChangeType::Modified, Some(old), Some(new)) => {
                if !self.holds_at(old, &id) || new >= self.documents.len() {
                    return None;
                }
                if old == new {
                    self.documents[old] = change.document.clone();
                    return Some(ChangeEvent::changed(change.document, new));
                }
                self.documents.remove(old);
                self.documents.insert(new, change.document.clone());
                Some(ChangeEvent::moved(change.document, new, old))
            }
            _ => None,
        }
    }
}

struct ArrayInner {
    query: Arc<dyn FirestoreQuery>,
    metadata_changes: MetadataChanges,
    state: Mutex<ArrayState>,
    listeners: ListenerRegistry<DocumentSnapshot>,
}

impl ArrayInner {
    fn on_snapshot(&self, generation: u64, result: SnapshotResult) {
        match result {
            Ok(snapshot) => self.apply_snapshot(generation, snapshot),
            Err(error) => self.on_cancelled(generation, error),
        }
    }

    fn apply_snapshot(&self, generation: u64, snapshot: QuerySnapshot) {
        let mut applied = 0;
        for change in snapshot.changes {
            let event = {
                let mut state = lock(&self.state);
                if !state.is_live(generation) {
                    trace!("dropping snapshot from ended session");
                    return;
                }
                let id = change.document.id().to_string();
                let kind = change.change_type;
                match state.apply(change) {
                    Some(event) => event,
                    None => {
                        warn!(id = %id, change = ?kind, "skipping document change inconsistent with local list");
                        continue;
                    }
                }
            };
            applied += 1;
            self.listeners.notify_child_changed(&event);
        }

        {
            let mut state = lock(&self.state);
            if !state.is_live(generation) {
                return;
            }
            state.has_data_changed = true;
        }
        trace!(applied, from_cache = snapshot.metadata.is_from_cache, "snapshot applied");
        self.listeners.notify_data_changed();
    }

    fn on_cancelled(&self, generation: u64, error: FirestoreError) {
        let registration = {
            let mut state = lock(&self.state);
            if !state.is_live(generation) {
                return;
            }
            let Some(session) = state.session.as_mut() else {
                return;
            };
            session.cancelled = true;
            session.registration.take()
        };
        if let Some(registration) = registration {
            self.query.remove(registration);
        }
        warn!(error = %error, "firestore listener cancelled");
        self.listeners
            .notify_error(&ArrayError::SourceCancelled(error.into()));
    }

    fn replay(&self, handle: ListenerHandle) {
        let (entries, synced) = {
            let state = lock(&self.state);
            (state.documents.clone(), state.has_data_changed)
        };
        self.listeners.replay(handle, entries, synced);
    }
}

impl Drop for ArrayInner {
    fn drop(&mut self) {
        let registration = lock(&self.state)
            .session
            .take()
            .and_then(|session| session.registration);
        if let Some(registration) = registration {
            self.query.remove(registration);
        }
    }
}

/// Local, ordered mirror of the documents of a Firestore query
///
/// # Example
///
/// ```
/// use firebase_ui_rust::firestore::{
///     DocumentChange, DocumentSnapshot, FirestoreArray, QuerySnapshot, SnapshotFeed,
/// };
/// use firebase_ui_rust::ObservableSnapshotArray;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), firebase_ui_rust::ArrayError> {
/// let feed = Arc::new(SnapshotFeed::new());
/// let array = FirestoreArray::new(feed.clone());
/// array.start()?;
///
/// let doc = DocumentSnapshot::new("d1", json!({ "title": "Hello" }));
/// feed.push(QuerySnapshot {
///     documents: vec![doc.clone()],
///     changes: vec![DocumentChange::added(doc, 0)],
///     ..Default::default()
/// });
/// array.sync().await?;
///
/// assert_eq!(array.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FirestoreArray {
    inner: Arc<ArrayInner>,
}

impl FirestoreArray {
    /// Create a stopped array that ignores metadata-only snapshots
    pub fn new(query: Arc<dyn FirestoreQuery>) -> Self {
        Self::with_metadata_changes(query, MetadataChanges::default())
    }

    /// Create a stopped array, choosing whether metadata-only snapshots are
    /// delivered
    pub fn with_metadata_changes(
        query: Arc<dyn FirestoreQuery>,
        metadata_changes: MetadataChanges,
    ) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                query,
                metadata_changes,
                state: Mutex::new(ArrayState::default()),
                listeners: ListenerRegistry::new(),
            }),
        }
    }

    /// Wait until every snapshot queued before this call has been applied
    ///
    /// Returns [`ArrayError::NotListening`] if the array is stopped.
    pub async fn sync(&self) -> Result<(), ArrayError> {
        let handle = lock(&self.inner.state)
            .session
            .as_ref()
            .map(|session| session.queue.handle())
            .ok_or(ArrayError::NotListening)?;
        handle.barrier().await
    }

    /// Check if the query failed during the current session
    pub fn is_cancelled(&self) -> bool {
        lock(&self.inner.state)
            .session
            .as_ref()
            .is_some_and(|session| session.cancelled)
    }

    fn sink(&self, generation: u64, queue: &DispatchQueue) -> EventSink<SnapshotResult> {
        let handle = queue.handle();
        let weak: Weak<ArrayInner> = Arc::downgrade(&self.inner);
        EventSink::new(move |result: SnapshotResult| {
            let weak = weak.clone();
            handle.submit(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_snapshot(generation, result);
                }
            })
        })
    }
}

impl ObservableSnapshotArray for FirestoreArray {
    type Snapshot = DocumentSnapshot;

    fn len(&self) -> usize {
        lock(&self.inner.state).documents.len()
    }

    fn get(&self, index: usize) -> Result<DocumentSnapshot, ArrayError> {
        let state = lock(&self.inner.state);
        state
            .documents
            .get(index)
            .cloned()
            .ok_or(ArrayError::IndexOutOfRange {
                index,
                len: state.documents.len(),
            })
    }

    fn index_of_key(&self, key: &str) -> Option<usize> {
        lock(&self.inner.state).position(key)
    }

    fn snapshots(&self) -> Vec<DocumentSnapshot> {
        lock(&self.inner.state).documents.clone()
    }

    fn start(&self) -> Result<(), ArrayError> {
        let mut state = lock(&self.inner.state);
        if state.session.is_some() {
            return Err(ArrayError::AlreadyListening);
        }

        let queue = DispatchQueue::spawn()?;
        state.generation += 1;
        let generation = state.generation;
        let sink = self.sink(generation, &queue);
        let registration = self
            .inner
            .query
            .add_snapshot_listener(self.inner.metadata_changes, sink)
            .map_err(|e| ArrayError::SourceCancelled(e.into()))?;

        state.has_data_changed = false;
        state.session = Some(Session {
            generation,
            queue,
            registration: Some(registration),
            cancelled: false,
        });
        debug!(generation, "firestore array started");
        Ok(())
    }

    fn stop(&self) {
        let session = {
            let mut state = lock(&self.inner.state);
            let Some(session) = state.session.take() else {
                return;
            };
            state.generation += 1;
            state.documents.clear();
            state.has_data_changed = false;
            session
        };

        if let Some(registration) = session.registration {
            self.inner.query.remove(registration);
        }
        self.inner.listeners.activate_all();
        debug!(generation = session.generation, "firestore array stopped");
    }

    fn is_listening(&self) -> bool {
        lock(&self.inner.state).session.is_some()
    }

    fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerHandle
    where
        L: ChangeEventListener<DocumentSnapshot> + 'static,
    {
        let state = lock(&self.inner.state);
        let Some(session) = state.session.as_ref() else {
            return self.inner.listeners.add(listener, true);
        };

        let handle = self.inner.listeners.add(listener, false);
        let weak = Arc::downgrade(&self.inner);
        let queued = session.queue.submit(move || {
            if let Some(inner) = weak.upgrade() {
                inner.replay(handle);
            }
        });
        if !queued {
            self.inner.listeners.activate(handle);
        }
        handle
    }

    fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.inner.listeners.remove(handle)
    }

    fn remove_all_listeners(&self) {
        self.inner.listeners.clear();
    }
}

impl std::fmt::Debug for FirestoreArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreArray")
            .field("len", &self.len())
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}
