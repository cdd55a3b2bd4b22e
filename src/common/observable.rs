//! The read/observe contract shared by every array variant

use super::listener::{ChangeEventListener, ListenerHandle};
use super::parser::{ClassSnapshotParser, KeyedSnapshot, SnapshotParser};
use super::stream::{ChangeEventStream, ForwardingListener};
use crate::error::ArrayError;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A local, ordered, observable mirror of a remote collection
///
/// Implemented by [`FirebaseArray`](crate::database::FirebaseArray),
/// [`FirebaseIndexArray`](crate::database::FirebaseIndexArray) and
/// [`FirestoreArray`](crate::firestore::FirestoreArray).
pub trait ObservableSnapshotArray: Clone + Send + Sync + 'static {
    /// Snapshot type held by the array
    type Snapshot: KeyedSnapshot;

    /// Number of visible entries
    fn len(&self) -> usize;

    /// Check if the array holds no visible entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry at `index`
    fn get(&self, index: usize) -> Result<Self::Snapshot, ArrayError>;

    /// Index of the entry with `key`, if present
    fn index_of_key(&self, key: &str) -> Option<usize>;

    /// Copy of all visible entries, in order
    fn snapshots(&self) -> Vec<Self::Snapshot>;

    /// Begin listening to the remote source
    ///
    /// Returns [`ArrayError::AlreadyListening`] if the array is already listening.
    fn start(&self) -> Result<(), ArrayError>;

    /// Stop listening and clear the array. A no-op when not listening.
    fn stop(&self);

    /// Check if the array is listening to its remote source
    fn is_listening(&self) -> bool;

    /// Attach a listener
    ///
    /// The array holds the listener weakly: dropping the last `Arc` detaches
    /// it. A listener added while the array is listening is first replayed
    /// the current contents as `Added` events.
    fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerHandle
    where
        L: ChangeEventListener<Self::Snapshot> + 'static;

    /// Detach a listener. Returns false if the handle was not registered.
    fn remove_listener(&self, handle: ListenerHandle) -> bool;

    /// Detach every listener
    fn remove_all_listeners(&self);

    /// Convert the entry at `index` with a parser
    fn parse<T>(
        &self,
        index: usize,
        parser: &dyn SnapshotParser<Self::Snapshot, T>,
    ) -> Result<T, ArrayError> {
        parser.parse_snapshot(&self.get(index)?)
    }

    /// Deserialize the entry at `index` into `T`
    fn get_object<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArrayError> {
        self.parse(index, &ClassSnapshotParser::<T>::new())
    }

    /// Deserialize every visible entry into `T`, in order
    fn objects<T: DeserializeOwned>(&self) -> Result<Vec<T>, ArrayError> {
        let parser = ClassSnapshotParser::<T>::new();
        self.snapshots()
            .iter()
            .map(|snapshot| parser.parse_snapshot(snapshot))
            .collect()
    }

    /// Stream of change events; the listener is detached when the stream drops
    fn changes(&self) -> ChangeEventStream<Self::Snapshot> {
        let (listener, receiver) = ForwardingListener::new();
        let handle = self.add_listener(&listener);
        let array = self.clone();
        ChangeEventStream::new(receiver, listener, move || {
            array.remove_listener(handle);
        })
    }
}
