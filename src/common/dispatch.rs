//! Serialized dispatch for array sessions
//!
//! Every listening session owns one [`DispatchQueue`]: a Tokio task that
//! drains a FIFO of jobs one at a time. Remote events, fetch completions,
//! replays and sync barriers are all submitted here, so an array's state is
//! only ever mutated, and its listeners only ever notified, from one logical
//! thread.
//!
//! Dropping the queue cancels the driver task, the same way dropping a
//! snapshot stream cancels its listener.

use crate::error::ArrayError;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Owner of a session's dispatch task
pub(crate) struct DispatchQueue {
    handle: DispatchHandle,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl DispatchQueue {
    /// Spawn the driver task on the current Tokio runtime
    pub(crate) fn spawn() -> Result<Self, ArrayError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ArrayError::NoRuntime)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => {
                        trace!("dispatch queue cancelled");
                        break;
                    }
                    job = rx.recv() => {
                        match job {
                            Some(job) => job(),
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(Self {
            handle: DispatchHandle { tx },
            cancel_tx: Some(cancel_tx),
        })
    }

    pub(crate) fn handle(&self) -> DispatchHandle {
        self.handle.clone()
    }

    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.handle.submit(job)
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            // Ignore error if the driver already exited
            let _ = tx.send(());
        }
    }
}

/// Cloneable submitter for a session's dispatch queue
#[derive(Clone)]
pub(crate) struct DispatchHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl DispatchHandle {
    /// Queue a job. Returns false once the session has ended.
    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }

    /// Wait until every job queued before this call has run
    pub(crate) async fn barrier(&self) -> Result<(), ArrayError> {
        let (done_tx, done_rx) = oneshot::channel();
        if !self.submit(move || {
            let _ = done_tx.send(());
        }) {
            return Err(ArrayError::NotListening);
        }
        done_rx.await.map_err(|_| ArrayError::NotListening)
    }
}

/// Entry point through which a remote source delivers events to an array
///
/// Sinks are cheap to clone and may be used from any thread. Events are
/// queued and applied in the order they are sent.
pub struct EventSink<E> {
    deliver: Arc<dyn Fn(E) -> bool + Send + Sync>,
}

impl<E> EventSink<E> {
    /// Create a sink from a delivery function
    ///
    /// The function returns false once the receiving array stopped listening.
    pub fn new(deliver: impl Fn(E) -> bool + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Deliver an event. Returns false if the array is no longer listening.
    pub fn send(&self, event: E) -> bool {
        (self.deliver)(event)
    }
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            deliver: Arc::clone(&self.deliver),
        }
    }
}

impl<E> std::fmt::Debug for EventSink<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// Handle returned by a remote source when a listener is attached
///
/// Passed back to the source to detach the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerRegistration(u64);

impl ListenerRegistration {
    /// Wrap a source-specific listener id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Source-specific listener id
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order() {
        let queue = DispatchQueue::spawn().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let seen = Arc::clone(&seen);
            assert!(queue.submit(move || seen.lock().unwrap().push(i)));
        }
        queue.handle().barrier().await.unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_drop_cancels_driver() {
        let queue = DispatchQueue::spawn().unwrap();
        let handle = queue.handle();
        drop(queue);

        // Give the driver a chance to observe the cancellation
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!handle.submit(|| {}));
        assert_eq!(handle.barrier().await, Err(ArrayError::NotListening));
    }

    #[test]
    fn test_spawn_requires_runtime() {
        assert!(matches!(DispatchQueue::spawn(), Err(ArrayError::NoRuntime)));
    }

    #[test]
    fn test_event_sink_forwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&seen);
        let sink = EventSink::new(move |event: u8| {
            capture.lock().unwrap().push(event);
            true
        });

        assert!(sink.clone().send(1));
        assert!(sink.send(2));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
