//! Change event streams for observable arrays.
//!
//! Adapts the listener interface into an async [`Stream`]. The stream owns
//! its forwarding listener and detaches it when dropped (RAII), so no
//! explicit `remove_listener` call is needed.
//!
//! # Example
//! ```no_run
//! use firebase_ui_rust::common::{ArrayEvent, ObservableSnapshotArray};
//! use firebase_ui_rust::database::{FirebaseArray, MemoryQuery};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let array = FirebaseArray::new(Arc::new(MemoryQuery::new()));
//! let mut changes = array.changes();
//! array.start()?;
//!
//! while let Some(event) = changes.next().await {
//!     match event {
//!         ArrayEvent::Child(change) => println!("{:?} at {}", change.event_type, change.index()),
//!         ArrayEvent::DataChanged => println!("in sync"),
//!         ArrayEvent::Error(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! // Listener automatically detached on drop
//! # Ok(())
//! # }
//! ```

use super::change_event::ChangeEvent;
use super::listener::ChangeEventListener;
use crate::error::ArrayError;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Item yielded by a [`ChangeEventStream`]
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayEvent<S> {
    /// A single entry changed
    Child(ChangeEvent<S>),
    /// A batch of remote changes was fully applied
    DataChanged,
    /// The array or one of its keys failed
    Error(ArrayError),
}

/// Listener that forwards every callback into a channel
pub(crate) struct ForwardingListener<S> {
    tx: mpsc::UnboundedSender<ArrayEvent<S>>,
}

impl<S> ForwardingListener<S> {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ArrayEvent<S>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl<S: Clone + Send + Sync> ChangeEventListener<S> for ForwardingListener<S> {
    fn on_child_changed(&self, event: &ChangeEvent<S>) {
        // Receiver gone means the stream is being dropped
        let _ = self.tx.send(ArrayEvent::Child(event.clone()));
    }

    fn on_data_changed(&self) {
        let _ = self.tx.send(ArrayEvent::DataChanged);
    }

    fn on_error(&self, error: &ArrayError) {
        let _ = self.tx.send(ArrayEvent::Error(error.clone()));
    }
}

/// A stream of change events from an observable array.
///
/// When dropped, the underlying listener is detached from the array.
pub struct ChangeEventStream<S> {
    receiver: mpsc::UnboundedReceiver<ArrayEvent<S>>,
    // Keeps the weakly registered listener alive for the stream's lifetime
    _listener: Arc<ForwardingListener<S>>,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl<S> ChangeEventStream<S> {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<ArrayEvent<S>>,
        listener: Arc<ForwardingListener<S>>,
        detach: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            _listener: listener,
            detach: Some(Box::new(detach)),
        }
    }
}

impl<S> Stream for ChangeEventStream<S> {
    type Item = ArrayEvent<S>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<S> Drop for ChangeEventStream<S> {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}
