//! In-memory database sources
//!
//! [`MemoryQuery`] behaves like a live ordered query over one location and
//! [`MemoryDataSource`] like a key-addressed location read with one-shot
//! fetches. Both are safe to share between threads and are meant for tests,
//! demos and offline use.
//!
//! # Example
//!
//! ```
//! use firebase_ui_rust::database::{FirebaseArray, MemoryQuery};
//! use firebase_ui_rust::ObservableSnapshotArray;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), firebase_ui_rust::ArrayError> {
//! let query = Arc::new(MemoryQuery::new());
//! query.set("alice", 2, json!({ "score": 20 }));
//! query.set("bob", 1, json!({ "score": 10 }));
//!
//! let array = FirebaseArray::new(query.clone());
//! array.start()?;
//! array.sync().await?;
//!
//! assert_eq!(array.get(0)?.key(), "bob");
//! # Ok(())
//! # }
//! ```

use super::data_snapshot::DataSnapshot;
use super::priority::Priority;
use super::snapshot_list::{ChildEvent, SnapshotList};
use super::source::{DataSource, DatabaseQuery, RemoteEvent};
use crate::common::{lock, EventSink, ListenerRegistration};
use crate::error::DatabaseError;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::trace;

#[derive(Default)]
struct QueryState {
    children: SnapshotList,
    subscribers: Vec<(ListenerRegistration, EventSink<RemoteEvent>)>,
    next_id: u64,
}

impl QueryState {
    fn broadcast(&mut self, event: RemoteEvent) {
        // Sinks report false once their array stopped listening
        self.subscribers.retain(|(_, sink)| sink.send(event.clone()));
    }

    fn previous_key(&self, key: &str) -> Option<String> {
        self.children
            .index_of_key(key)
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| self.children.get(index))
            .map(|snapshot| snapshot.key().to_string())
    }
}

/// Live query over an in-memory location
#[derive(Default)]
pub struct MemoryQuery {
    state: Mutex<QueryState>,
}

impl MemoryQuery {
    /// Create an empty location
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a child, notifying listeners with `Added` or `Changed`
    pub fn set(&self, key: &str, priority: impl Into<Priority>, value: Value) {
        self.write(DataSnapshot::with_priority(key, priority, value));
    }

    /// Change only the priority of an existing child. Returns false if the
    /// child does not exist.
    pub fn set_priority(&self, key: &str, priority: impl Into<Priority>) -> bool {
        let current = {
            let state = lock(&self.state);
            state
                .children
                .index_of_key(key)
                .and_then(|index| state.children.get(index).cloned())
        };
        match current {
            Some(snapshot) => {
                self.write(snapshot.into_priority(priority));
                true
            }
            None => false,
        }
    }

    /// Write a child with an explicit snapshot
    pub fn write(&self, snapshot: DataSnapshot) {
        let mut state = lock(&self.state);
        let exists = state.children.index_of_key(snapshot.key()).is_some();
        let key = snapshot.key().to_string();

        let local = if exists {
            ChildEvent::Changed {
                snapshot: snapshot.clone(),
                previous_child_key: None,
            }
        } else {
            ChildEvent::Added {
                snapshot: snapshot.clone(),
                previous_child_key: None,
            }
        };
        if state.children.apply(local).is_err() {
            return;
        }

        let previous_child_key = state.previous_key(&key);
        let event = if exists {
            ChildEvent::Changed {
                snapshot,
                previous_child_key,
            }
        } else {
            ChildEvent::Added {
                snapshot,
                previous_child_key,
            }
        };
        trace!(key = %key, "memory query write");
        state.broadcast(RemoteEvent::Child(event));
        state.broadcast(RemoteEvent::Synced);
    }

    /// Remove a child. Returns false if the child does not exist.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = lock(&self.state);
        let Some(index) = state.children.index_of_key(key) else {
            return false;
        };
        let Some(snapshot) = state.children.get(index).cloned() else {
            return false;
        };
        if state
            .children
            .apply(ChildEvent::Removed {
                snapshot: snapshot.clone(),
            })
            .is_err()
        {
            return false;
        }
        state.broadcast(RemoteEvent::Child(ChildEvent::Removed { snapshot }));
        state.broadcast(RemoteEvent::Synced);
        true
    }

    /// Send a raw event to every listener without touching the stored children
    pub fn emit(&self, event: RemoteEvent) {
        lock(&self.state).broadcast(event);
    }

    /// Cancel every listener with `error`, as a server-side revoke would
    pub fn cancel(&self, error: DatabaseError) {
        let mut state = lock(&self.state);
        for (_, sink) in state.subscribers.drain(..) {
            sink.send(RemoteEvent::Cancelled(error.clone()));
        }
    }

    /// Number of attached listeners
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }

    /// Stored children, in order
    pub fn children(&self) -> Vec<DataSnapshot> {
        lock(&self.state).children.as_slice().to_vec()
    }
}

impl DatabaseQuery for MemoryQuery {
    fn listen(&self, sink: EventSink<RemoteEvent>) -> Result<ListenerRegistration, DatabaseError> {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let registration = ListenerRegistration::new(state.next_id);

        let mut previous_child_key = None;
        for snapshot in state.children.iter() {
            let key = snapshot.key().to_string();
            sink.send(RemoteEvent::Child(ChildEvent::Added {
                snapshot: snapshot.clone(),
                previous_child_key: previous_child_key.replace(key),
            }));
        }
        sink.send(RemoteEvent::Synced);

        state.subscribers.push((registration, sink));
        Ok(registration)
    }

    fn unlisten(&self, registration: ListenerRegistration) {
        lock(&self.state)
            .subscribers
            .retain(|(id, _)| *id != registration);
    }
}

#[derive(Default)]
struct SourceState {
    children: HashMap<String, DataSnapshot>,
    failures: HashMap<String, VecDeque<DatabaseError>>,
    fetches: HashMap<String, u32>,
}

/// Key-addressed in-memory location for one-shot reads
#[derive(Default)]
pub struct MemoryDataSource {
    state: Mutex<SourceState>,
}

impl MemoryDataSource {
    /// Create an empty location
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a child
    pub fn set(&self, key: &str, value: Value) {
        lock(&self.state)
            .children
            .insert(key.to_string(), DataSnapshot::new(key, value));
    }

    /// Remove a child
    pub fn remove(&self, key: &str) -> bool {
        lock(&self.state).children.remove(key).is_some()
    }

    /// Make the next `times` reads of `key` fail with `error`
    pub fn fail_next(&self, key: &str, times: u32, error: DatabaseError) {
        let mut state = lock(&self.state);
        let queue = state.failures.entry(key.to_string()).or_default();
        queue.extend(std::iter::repeat(error).take(times as usize));
    }

    /// Number of reads issued for `key`
    pub fn fetch_count(&self, key: &str) -> u32 {
        lock(&self.state).fetches.get(key).copied().unwrap_or(0)
    }
}

impl DataSource for MemoryDataSource {
    fn fetch_once(&self, key: &str) -> BoxFuture<'static, Result<Option<DataSnapshot>, DatabaseError>> {
        let mut state = lock(&self.state);
        *state.fetches.entry(key.to_string()).or_insert(0) += 1;

        let result = match state.failures.get_mut(key).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(state.children.get(key).cloned()),
        };
        future::ready(result).boxed()
    }
}
