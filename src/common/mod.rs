//! Building blocks shared by every array variant
//!
//! - `change_event.rs` - change events and their types
//! - `listener.rs` - listener trait and weakly held registry
//! - `dispatch.rs` - per-session serialized dispatch queue and event sinks
//! - `observable.rs` - the `ObservableSnapshotArray` read/observe contract
//! - `parser.rs` - snapshot to model conversion
//! - `settings.rs` - array configuration
//! - `stream.rs` - change events as an async stream

pub mod change_event;
pub mod dispatch;
pub mod listener;
pub mod observable;
pub mod parser;
pub mod settings;
/// Stream adapters for array change events
pub mod stream;

// Re-export from change_event module
pub use change_event::{ChangeEvent, ChangeEventType};

// Re-export from dispatch module
pub use dispatch::{EventSink, ListenerRegistration};

// Re-export from listener module
pub use listener::{ChangeEventListener, ListenerHandle};

// Re-export from observable module
pub use observable::ObservableSnapshotArray;

// Re-export from parser module
pub use parser::{ClassSnapshotParser, KeyParser, KeyedSnapshot, SnapshotParser};

// Re-export from settings module
pub use settings::ArraySettings;

// Re-export from stream module
pub use stream::{ArrayEvent, ChangeEventStream};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a listener panicked while it was held
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
