//! Ordered, observable mirror of a Realtime Database query
//!
//! [`FirebaseArray`] listens to a [`DatabaseQuery`], folds each child event
//! into a [`SnapshotList`] and tells its listeners exactly which position
//! changed. All event handling runs on the array's dispatch queue.
//!
//! # Example
//!
//! ```
//! use firebase_ui_rust::common::{ChangeEvent, ChangeEventListener};
//! use firebase_ui_rust::database::{DataSnapshot, FirebaseArray, MemoryQuery};
//! use firebase_ui_rust::{ArrayError, ObservableSnapshotArray};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct PrintListener;
//!
//! impl ChangeEventListener<DataSnapshot> for PrintListener {
//!     fn on_child_changed(&self, event: &ChangeEvent<DataSnapshot>) {
//!         println!("{:?} {} at {}", event.event_type, event.snapshot.key(), event.index());
//!     }
//!
//!     fn on_error(&self, error: &ArrayError) {
//!         eprintln!("array failed: {}", error);
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ArrayError> {
//! let query = Arc::new(MemoryQuery::new());
//! let array = FirebaseArray::new(query.clone());
//! let listener = Arc::new(PrintListener);
//! array.add_listener(&listener);
//!
//! array.start()?;
//! query.set("k1", 1, json!({ "text": "hello" }));
//! array.sync().await?;
//! assert_eq!(array.len(), 1);
//!
//! array.stop();
//! # Ok(())
//! # }
//! ```

use super::data_snapshot::DataSnapshot;
use super::snapshot_list::SnapshotList;
use super::source::{DatabaseQuery, RemoteEvent};
use crate::common::dispatch::DispatchQueue;
use crate::common::listener::ListenerRegistry;
use crate::common::{
    lock, ChangeEventListener, EventSink, ListenerHandle, ListenerRegistration,
    ObservableSnapshotArray,
};
use crate::error::ArrayError;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, trace, warn};

/// One start/stop cycle
struct Session {
    generation: u64,
    queue: DispatchQueue,
    registration: Option<ListenerRegistration>,
    /// Set once the source cancelled the listener
    cancelled: bool,
}

#[derive(Default)]
struct ArrayState {
    snapshots: SnapshotList,
    session: Option<Session>,
    generation: u64,
    has_data_changed: bool,
}

impl ArrayState {
    /// Session that may still apply events tagged with `generation`
    fn live_session(&mut self, generation: u64) -> Option<&mut Session> {
        self.session
            .as_mut()
            .filter(|session| session.generation == generation && !session.cancelled)
    }
}

struct ArrayInner {
    query: Arc<dyn DatabaseQuery>,
    state: Mutex<ArrayState>,
    listeners: ListenerRegistry<DataSnapshot>,
}

impl ArrayInner {
    fn on_remote_event(&self, generation: u64, event: RemoteEvent) {
        match event {
            RemoteEvent::Child(child) => {
                let change = {
                    let mut state = lock(&self.state);
                    if state.live_session(generation).is_none() {
                        trace!(key = child.key(), "dropping event from ended session");
                        return;
                    }
                    match state.snapshots.apply(child) {
                        Ok(change) => change,
                        Err(e) => {
                            warn!(error = %e, "discarding child event");
                            return;
                        }
                    }
                };
                self.listeners.notify_child_changed(&change);
            }
            RemoteEvent::Synced => {
                {
                    let mut state = lock(&self.state);
                    if state.live_session(generation).is_none() {
                        return;
                    }
                    state.has_data_changed = true;
                }
                self.listeners.notify_data_changed();
            }
            RemoteEvent::Cancelled(error) => {
                let registration = {
                    let mut state = lock(&self.state);
                    let Some(session) = state.live_session(generation) else {
                        return;
                    };
                    session.cancelled = true;
                    session.registration.take()
                };
                if let Some(registration) = registration {
                    self.query.unlisten(registration);
                }
                warn!(error = %error, "database listener cancelled");
                self.listeners
                    .notify_error(&ArrayError::SourceCancelled(error.into()));
            }
        }
    }

    fn replay(&self, handle: ListenerHandle) {
        let (entries, synced) = {
            let state = lock(&self.state);
            (state.snapshots.as_slice().to_vec(), state.has_data_changed)
        };
        trace!(listener = handle.id(), entries = entries.len(), "replaying to new listener");
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
            self.query.unlisten(registration);
        }
    }
}

/// Local, ordered mirror of the children of a database query
///
/// Cloning is cheap; clones share the same list, session and listeners.
#[derive(Clone)]
pub struct FirebaseArray {
    inner: Arc<ArrayInner>,
}

impl FirebaseArray {
    /// Create a stopped array over `query`
    pub fn new(query: Arc<dyn DatabaseQuery>) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                query,
                state: Mutex::new(ArrayState::default()),
                listeners: ListenerRegistry::new(),
            }),
        }
    }

    /// Wait until every event queued before this call has been applied and
    /// dispatched
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

    /// Check if the source cancelled the current session
    pub fn is_cancelled(&self) -> bool {
        lock(&self.inner.state)
            .session
            .as_ref()
            .is_some_and(|session| session.cancelled)
    }

    /// Check if the initial load of the current session completed
    pub fn has_data_changed(&self) -> bool {
        lock(&self.inner.state).has_data_changed
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Run `job` on the current session's dispatch queue. Returns false when
    /// the array is not listening.
    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        lock(&self.inner.state)
            .session
            .as_ref()
            .is_some_and(|session| session.queue.submit(job))
    }

    /// Borrow the ordered children for the duration of `f`.
    ///
    /// `f` runs under the array's lock and must not call back into it.
    pub(crate) fn with_snapshots<R>(&self, f: impl FnOnce(&[DataSnapshot]) -> R) -> R {
        f(lock(&self.inner.state).snapshots.as_slice())
    }

    /// Register a listener that is only held by the caller's `Arc`, without
    /// replay. Used by arrays layered on top of this one.
    pub(crate) fn add_internal_listener<L>(&self, listener: &Arc<L>) -> ListenerHandle
    where
        L: ChangeEventListener<DataSnapshot> + 'static,
    {
        self.inner.listeners.add(listener, true)
    }

    fn sink(&self, generation: u64, queue: &DispatchQueue) -> EventSink<RemoteEvent> {
        let handle = queue.handle();
        let weak: Weak<ArrayInner> = Arc::downgrade(&self.inner);
        EventSink::new(move |event: RemoteEvent| {
            let weak = weak.clone();
            handle.submit(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_remote_event(generation, event);
                }
            })
        })
    }
}

impl ObservableSnapshotArray for FirebaseArray {
    type Snapshot = DataSnapshot;

    fn len(&self) -> usize {
        lock(&self.inner.state).snapshots.len()
    }

    fn get(&self, index: usize) -> Result<DataSnapshot, ArrayError> {
        let state = lock(&self.inner.state);
        state
            .snapshots
            .get(index)
            .cloned()
            .ok_or(ArrayError::IndexOutOfRange {
                index,
                len: state.snapshots.len(),
            })
    }

    fn index_of_key(&self, key: &str) -> Option<usize> {
        lock(&self.inner.state).snapshots.index_of_key(key)
    }

    fn snapshots(&self) -> Vec<DataSnapshot> {
        lock(&self.inner.state).snapshots.as_slice().to_vec()
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

        // Sinks only enqueue, so listening while locked cannot re-enter
        let registration = self
            .inner
            .query
            .listen(sink)
            .map_err(|e| ArrayError::SourceCancelled(e.into()))?;

        state.has_data_changed = false;
        state.session = Some(Session {
            generation,
            queue,
            registration: Some(registration),
            cancelled: false,
        });
        debug!(generation, "firebase array started");
        Ok(())
    }

    fn stop(&self) {
        let session = {
            let mut state = lock(&self.inner.state);
            let Some(session) = state.session.take() else {
                return;
            };
            state.generation += 1;
            state.snapshots.clear();
            state.has_data_changed = false;
            session
        };

        if let Some(registration) = session.registration {
            self.inner.query.unlisten(registration);
        }
        // Listeners still waiting for a replay would otherwise stay muted
        self.inner.listeners.activate_all();
        debug!(generation = session.generation, "firebase array stopped");
    }

    fn is_listening(&self) -> bool {
        lock(&self.inner.state).session.is_some()
    }

    fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerHandle
    where
        L: ChangeEventListener<DataSnapshot> + 'static,
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

impl std::fmt::Debug for FirebaseArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseArray")
            .field("len", &self.len())
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}
