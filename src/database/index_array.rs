//! Indexed mirror that joins a key query with a data location
//!
//! [`FirebaseIndexArray`] keeps the order of an index query (one child per
//! key) and fills each position with the payload read from a
//! [`DataSource`]. Keys whose payload has not arrived yet are invisible:
//! visible indices count resolved entries only.
//!
//! Key events and fetch completions are both handled on the key array's
//! dispatch queue, so the visible list only changes from one place.
//!
//! # Key lifecycle
//!
//! ```text
//! PendingIndexOnly -> Resolving -> Resolved
//!                              \-> Failed
//! ```
//!
//! A key leaves tracking when the index removes it.

use super::data_snapshot::DataSnapshot;
use super::firebase_array::FirebaseArray;
use super::source::{DataSource, DatabaseQuery};
use crate::common::listener::ListenerRegistry;
use crate::common::{
    lock, ArraySettings, ChangeEvent, ChangeEventListener, ChangeEventType, ListenerHandle,
    ObservableSnapshotArray,
};
use crate::error::{ArrayError, DatabaseError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// Resolution state of one indexed key
#[derive(Debug, Clone, PartialEq)]
pub enum KeyState {
    /// Present in the index, no payload
    PendingIndexOnly,
    /// A fetch is in flight
    Resolving,
    /// Payload loaded and visible
    Resolved,
    /// Fetching the payload failed. A key that was visible before keeps its
    /// last payload.
    Failed(ArrayError),
}

/// Maps index entries onto data keys
pub trait JoinResolver: Send + Sync {
    /// Data key to read for an index entry. Defaults to the index key.
    fn join(&self, index_snapshot: &DataSnapshot) -> String {
        index_snapshot.key().to_string()
    }

    /// Called when an indexed key has no data. `index` is the key's position
    /// in the index query.
    fn on_join_failed(&self, key: &str, index: usize) {
        warn!(key, index, "indexed key has no data");
    }
}

/// Joins index key `k` to data key `k`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultJoinResolver;

impl JoinResolver for DefaultJoinResolver {}

struct Tracked {
    state: KeyState,
    data_key: String,
    /// Id of the newest fetch; older results are stale
    fetch_id: u64,
    in_flight: bool,
}

#[derive(Default)]
struct IndexState {
    tracked: HashMap<String, Tracked>,
    /// Resolved entries in index order, tagged with their index key
    visible: Vec<(String, DataSnapshot)>,
    next_fetch_id: u64,
    generation: u64,
    cancelled: bool,
    /// The key array synced while fetches were outstanding
    sync_pending: bool,
    has_data_changed: bool,
}

impl IndexState {
    fn visible_index(&self, key: &str) -> Option<usize> {
        self.visible.iter().position(|(k, _)| k == key)
    }

    /// Visible position for `key`, given the index order in `keys`
    ///
    /// `visible` is a subsequence of `keys`, so one merge walk counts the
    /// visible entries ahead of `key`.
    fn position_for(&self, key: &str, keys: &[DataSnapshot]) -> usize {
        let mut cursor = 0;
        for k in keys {
            if k.key() == key {
                break;
            }
            if self.visible.get(cursor).is_some_and(|(v, _)| v == k.key()) {
                cursor += 1;
            }
        }
        cursor
    }

    fn in_flight(&self) -> usize {
        self.tracked.values().filter(|t| t.in_flight).count()
    }

    fn reset(&mut self) {
        self.tracked.clear();
        self.visible.clear();
        self.generation += 1;
        self.cancelled = false;
        self.sync_pending = false;
        self.has_data_changed = false;
    }
}

/// Outcome of a fetch, including the number of attempts it took
struct FetchOutcome {
    result: Result<Option<DataSnapshot>, DatabaseError>,
    attempts: u32,
}

struct IndexInner {
    keys: FirebaseArray,
    data: Arc<dyn DataSource>,
    resolver: Arc<dyn JoinResolver>,
    settings: ArraySettings,
    state: Mutex<IndexState>,
    listeners: ListenerRegistry<DataSnapshot>,
    key_listener: Arc<KeyListener>,
    idle: Notify,
}

impl IndexInner {
    fn on_key_event(self: &Arc<Self>, event: &ChangeEvent<DataSnapshot>) {
        let key = event.snapshot.key();
        match event.event_type {
            ChangeEventType::Added => {
                let data_key = self.resolver.join(&event.snapshot);
                {
                    let mut state = lock(&self.state);
                    if state.cancelled {
                        return;
                    }
                    state.tracked.insert(
                        key.to_string(),
                        Tracked {
                            state: KeyState::PendingIndexOnly,
                            data_key,
                            fetch_id: 0,
                            in_flight: false,
                        },
                    );
                }
                self.start_fetch(key);
            }
            ChangeEventType::Changed => {
                let data_key = self.resolver.join(&event.snapshot);
                if let Some(tracked) = lock(&self.state).tracked.get_mut(key) {
                    tracked.data_key = data_key;
                }
                self.start_fetch(key);
            }
            ChangeEventType::Removed => {
                let removed = {
                    let mut state = lock(&self.state);
                    state.tracked.remove(key);
                    match state.visible_index(key) {
                        Some(index) => Some((index, state.visible.remove(index).1)),
                        None => None,
                    }
                };
                if let Some((index, snapshot)) = removed {
                    self.listeners
                        .notify_child_changed(&ChangeEvent::removed(snapshot, index));
                }
                self.finish_if_idle();
            }
            ChangeEventType::Moved => {
                let moved = self.keys.with_snapshots(|keys| {
                    let mut state = lock(&self.state);
                    state.visible_index(key).map(|old_index| {
                        let entry = state.visible.remove(old_index);
                        let new_index = state.position_for(key, keys);
                        state.visible.insert(new_index, entry.clone());
                        ChangeEvent::moved(entry.1, new_index, old_index)
                    })
                });
                if let Some(change) = moved {
                    self.listeners.notify_child_changed(&change);
                }
            }
        }
    }

    fn on_key_synced(&self) {
        {
            let mut state = lock(&self.state);
            if state.cancelled {
                return;
            }
            if state.in_flight() > 0 {
                state.sync_pending = true;
                return;
            }
            state.has_data_changed = true;
        }
        self.listeners.notify_data_changed();
    }

    fn on_key_error(&self, error: &ArrayError) {
        if error.is_fatal() {
            let mut state = lock(&self.state);
            state.cancelled = true;
            state.sync_pending = false;
            for tracked in state.tracked.values_mut() {
                tracked.in_flight = false;
            }
        }
        self.listeners.notify_error(error);
        self.idle.notify_waiters();
    }

    /// Issue a fresh fetch for `key`, superseding any fetch in flight
    fn start_fetch(self: &Arc<Self>, key: &str) {
        let (data_key, fetch_id, generation) = {
            let mut state = lock(&self.state);
            state.next_fetch_id += 1;
            let fetch_id = state.next_fetch_id;
            let generation = state.generation;
            let visible = state.visible_index(key).is_some();
            let Some(tracked) = state.tracked.get_mut(key) else {
                return;
            };
            tracked.fetch_id = fetch_id;
            tracked.in_flight = true;
            // A visible key keeps its state and payload while refreshing
            if !visible {
                tracked.state = KeyState::Resolving;
            }
            (tracked.data_key.clone(), fetch_id, generation)
        };

        trace!(key, data_key = %data_key, fetch_id, "fetching indexed key");
        let weak = Arc::downgrade(self);
        let key = key.to_string();
        tokio::spawn(async move {
            let Some(outcome) = fetch_with_retry(&weak, &key, &data_key, fetch_id).await else {
                return;
            };
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let target = Arc::downgrade(&inner);
            let queued = inner.keys.submit(move || {
                if let Some(inner) = target.upgrade() {
                    inner.on_fetch_complete(&key, fetch_id, generation, outcome);
                }
            });
            if !queued {
                trace!("array stopped before fetch completed");
            }
        });
    }

    fn is_current_fetch(&self, key: &str, fetch_id: u64) -> bool {
        let state = lock(&self.state);
        !state.cancelled
            && state
                .tracked
                .get(key)
                .is_some_and(|tracked| tracked.fetch_id == fetch_id)
    }

    fn on_fetch_complete(&self, key: &str, fetch_id: u64, generation: u64, outcome: FetchOutcome) {
        let mut change = None;
        let mut error = None;
        let mut join_failed = false;
        let applied = self.keys.with_snapshots(|keys| {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            if state.generation != generation || state.cancelled {
                trace!(key, "discarding fetch from ended session");
                return false;
            }
            let visible_index = state.visible_index(key);
            let Some(tracked) = state.tracked.get_mut(key) else {
                trace!(key, "discarding fetch for removed key");
                return false;
            };
            if tracked.fetch_id != fetch_id {
                trace!(key, fetch_id, "discarding superseded fetch");
                return false;
            }
            tracked.in_flight = false;

            match outcome.result {
                Ok(Some(snapshot)) => {
                    tracked.state = KeyState::Resolved;
                    change = Some(match visible_index {
                        Some(index) => {
                            state.visible[index].1 = snapshot.clone();
                            ChangeEvent::changed(snapshot, index)
                        }
                        None => {
                            let index = state.position_for(key, keys);
                            state.visible.insert(index, (key.to_string(), snapshot.clone()));
                            ChangeEvent::added(snapshot, index)
                        }
                    });
                }
                Ok(None) => {
                    tracked.state = KeyState::PendingIndexOnly;
                    join_failed = true;
                    if let Some(index) = visible_index {
                        let (_, snapshot) = state.visible.remove(index);
                        change = Some(ChangeEvent::removed(snapshot, index));
                    }
                }
                Err(source) => {
                    let failure = ArrayError::KeyResolution {
                        key: key.to_string(),
                        attempts: outcome.attempts,
                        source,
                    };
                    tracked.state = KeyState::Failed(failure.clone());
                    error = Some(failure);
                }
            }
            true
        });
        if !applied {
            return;
        }

        if let Some(change) = change {
            self.listeners.notify_child_changed(&change);
        }
        if join_failed {
            let index = self
                .keys
                .index_of_key(key)
                .unwrap_or_else(|| self.keys.len());
            self.resolver.on_join_failed(key, index);
        }
        if let Some(error) = error {
            warn!(error = %error, "indexed key failed to resolve");
            self.listeners.notify_error(&error);
        }
        self.finish_if_idle();
    }

    /// Deliver a deferred `on_data_changed` once no fetch is outstanding
    fn finish_if_idle(&self) {
        let notify = {
            let mut state = lock(&self.state);
            if state.in_flight() > 0 {
                return;
            }
            let notify = state.sync_pending;
            if notify {
                state.sync_pending = false;
                state.has_data_changed = true;
            }
            notify
        };
        if notify {
            self.listeners.notify_data_changed();
        }
        self.idle.notify_waiters();
    }

    fn replay(&self, handle: ListenerHandle) {
        let (entries, synced) = {
            let state = lock(&self.state);
            let entries = state.visible.iter().map(|(_, s)| s.clone()).collect();
            (entries, state.has_data_changed)
        };
        self.listeners.replay(handle, entries, synced);
    }
}

/// Read `data_key`, retrying retryable errors with backoff
///
/// Returns `None` when the result is no longer wanted.
async fn fetch_with_retry(
    inner: &Weak<IndexInner>,
    key: &str,
    data_key: &str,
    fetch_id: u64,
) -> Option<FetchOutcome> {
    let mut attempts = 0;
    loop {
        let (data, settings) = {
            let inner = inner.upgrade()?;
            if !inner.is_current_fetch(key, fetch_id) {
                return None;
            }
            (Arc::clone(&inner.data), inner.settings.clone())
        };

        attempts += 1;
        let result = data.fetch_once(data_key).await;
        match result {
            Err(e) if e.is_retryable() && attempts < settings.max_fetch_attempts => {
                let delay = settings.retry_delay(attempts);
                debug!(key, attempts, error = %e, delay_ms = delay.as_millis() as u64, "retrying fetch");
                tokio::time::sleep(delay).await;
            }
            result => return Some(FetchOutcome { result, attempts }),
        }
    }
}

/// Listener attached to the key array
struct KeyListener {
    inner: Weak<IndexInner>,
}

impl ChangeEventListener<DataSnapshot> for KeyListener {
    fn on_child_changed(&self, event: &ChangeEvent<DataSnapshot>) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_key_event(event);
        }
    }

    fn on_data_changed(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_key_synced();
        }
    }

    fn on_error(&self, error: &ArrayError) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_key_error(error);
        }
    }
}

/// Ordered mirror of an index query joined with a data location
///
/// # Example
///
/// ```
/// use firebase_ui_rust::database::{FirebaseIndexArray, MemoryDataSource, MemoryQuery};
/// use firebase_ui_rust::ObservableSnapshotArray;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), firebase_ui_rust::ArrayError> {
/// let members = Arc::new(MemoryQuery::new());
/// let users = Arc::new(MemoryDataSource::new());
/// users.set("ada", json!({ "name": "Ada" }));
/// members.set("ada", 1, json!(true));
///
/// let array = FirebaseIndexArray::new(members, users);
/// array.start()?;
/// array.sync().await?;
///
/// assert_eq!(array.get(0)?.value(), &json!({ "name": "Ada" }));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FirebaseIndexArray {
    inner: Arc<IndexInner>,
}

impl FirebaseIndexArray {
    /// Create a stopped array with identity joins and default settings
    pub fn new(key_query: Arc<dyn DatabaseQuery>, data: Arc<dyn DataSource>) -> Self {
        Self::with_options(
            key_query,
            data,
            Arc::new(DefaultJoinResolver),
            ArraySettings::default(),
        )
    }

    /// Create a stopped array with a custom join and settings
    pub fn with_options(
        key_query: Arc<dyn DatabaseQuery>,
        data: Arc<dyn DataSource>,
        resolver: Arc<dyn JoinResolver>,
        settings: ArraySettings,
    ) -> Self {
        let keys = FirebaseArray::new(key_query);
        let inner = Arc::new_cyclic(|weak| IndexInner {
            keys: keys.clone(),
            data,
            resolver,
            settings,
            state: Mutex::new(IndexState::default()),
            listeners: ListenerRegistry::new(),
            key_listener: Arc::new(KeyListener {
                inner: weak.clone(),
            }),
            idle: Notify::new(),
        });
        keys.add_internal_listener(&inner.key_listener);
        Self { inner }
    }

    /// The underlying array of index keys
    pub fn keys(&self) -> &FirebaseArray {
        &self.inner.keys
    }

    /// Resolution state of an indexed key
    pub fn key_state(&self, key: &str) -> Option<KeyState> {
        lock(&self.inner.state)
            .tracked
            .get(key)
            .map(|tracked| tracked.state.clone())
    }

    /// Number of fetches in flight
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.state).in_flight()
    }

    /// Fetch the payload of an indexed key again
    ///
    /// Useful after a [`KeyState::Failed`] resolution.
    pub fn reload(&self, key: &str) -> Result<(), ArrayError> {
        let weak = Arc::downgrade(&self.inner);
        let key = key.to_string();
        let queued = self.inner.keys.submit(move || {
            if let Some(inner) = weak.upgrade() {
                inner.start_fetch(&key);
            }
        });
        queued.then_some(()).ok_or(ArrayError::NotListening)
    }

    /// Wait until queued key events are applied and no fetch is in flight
    ///
    /// Returns [`ArrayError::NotListening`] if the array is stopped.
    pub async fn sync(&self) -> Result<(), ArrayError> {
        loop {
            self.inner.keys.sync().await?;
            let idle = self.inner.idle.notified();
            if self.pending_count() == 0 {
                return Ok(());
            }
            idle.await;
        }
    }
}

impl ObservableSnapshotArray for FirebaseIndexArray {
    type Snapshot = DataSnapshot;

    fn len(&self) -> usize {
        lock(&self.inner.state).visible.len()
    }

    fn get(&self, index: usize) -> Result<DataSnapshot, ArrayError> {
        let state = lock(&self.inner.state);
        state
            .visible
            .get(index)
            .map(|(_, snapshot)| snapshot.clone())
            .ok_or(ArrayError::IndexOutOfRange {
                index,
                len: state.visible.len(),
            })
    }

    fn index_of_key(&self, key: &str) -> Option<usize> {
        lock(&self.inner.state).visible_index(key)
    }

    fn snapshots(&self) -> Vec<DataSnapshot> {
        lock(&self.inner.state)
            .visible
            .iter()
            .map(|(_, snapshot)| snapshot.clone())
            .collect()
    }

    fn start(&self) -> Result<(), ArrayError> {
        if self.inner.keys.is_listening() {
            return Err(ArrayError::AlreadyListening);
        }
        lock(&self.inner.state).reset();
        self.inner.keys.start()?;
        debug!("firebase index array started");
        Ok(())
    }

    fn stop(&self) {
        if !self.inner.keys.is_listening() {
            return;
        }
        // End the index session first so completions racing the key array's
        // shutdown are discarded
        lock(&self.inner.state).reset();
        self.inner.keys.stop();
        lock(&self.inner.state).reset();
        self.inner.listeners.activate_all();
        self.inner.idle.notify_waiters();
        debug!("firebase index array stopped");
    }

    fn is_listening(&self) -> bool {
        self.inner.keys.is_listening()
    }

    fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerHandle
    where
        L: ChangeEventListener<DataSnapshot> + 'static,
    {
        if !self.inner.keys.is_listening() {
            return self.inner.listeners.add(listener, true);
        }

        let handle = self.inner.listeners.add(listener, false);
        let weak = Arc::downgrade(&self.inner);
        let queued = self.inner.keys.submit(move || {
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

impl std::fmt::Debug for FirebaseIndexArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseIndexArray")
            .field("len", &self.len())
            .field("pending", &self.pending_count())
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}
