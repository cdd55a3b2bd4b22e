//! Change listeners and the registry that fans events out to them

use super::change_event::ChangeEvent;
use super::lock;
use crate::error::ArrayError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Observer of an observable snapshot array
///
/// All callbacks run on the array's dispatch queue, one at a time, in
/// listener registration order.
pub trait ChangeEventListener<S>: Send + Sync {
    /// A single entry was added, changed, removed or moved
    fn on_child_changed(&self, event: &ChangeEvent<S>);

    /// The array finished applying a batch of remote changes
    /// (initial load complete, or a remote write fully applied)
    fn on_data_changed(&self) {}

    /// The array, or one of its keys, failed
    fn on_error(&self, error: &ArrayError);
}

/// Token returned by `add_listener`, used to remove the listener later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    /// Raw id of this handle
    pub fn id(&self) -> u64 {
        self.0
    }
}

struct Entry<S> {
    handle: ListenerHandle,
    listener: Weak<dyn ChangeEventListener<S>>,
    /// Inactive listeners are waiting for their replay and skip live events
    active: bool,
}

/// Registration-ordered set of weakly held listeners
pub(crate) struct ListenerRegistry<S> {
    entries: Mutex<Vec<Entry<S>>>,
    next_id: AtomicU64,
}

impl<S> ListenerRegistry<S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener. The registry only keeps a weak reference.
    pub(crate) fn add<L>(&self, listener: &Arc<L>, active: bool) -> ListenerHandle
    where
        L: ChangeEventListener<S> + 'static,
    {
        let listener: Arc<dyn ChangeEventListener<S>> = listener.clone();
        let handle = ListenerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.entries).push(Entry {
            handle,
            listener: Arc::downgrade(&listener),
            active,
        });
        handle
    }

    pub(crate) fn remove(&self, handle: ListenerHandle) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|entry| entry.handle != handle);
        entries.len() != before
    }

    pub(crate) fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub(crate) fn activate(&self, handle: ListenerHandle) {
        if let Some(entry) = lock(&self.entries).iter_mut().find(|e| e.handle == handle) {
            entry.active = true;
        }
    }

    pub(crate) fn activate_all(&self) {
        for entry in lock(&self.entries).iter_mut() {
            entry.active = true;
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, handle: ListenerHandle) -> bool {
        lock(&self.entries).iter().any(|e| e.handle == handle)
    }

    /// Number of registered listeners that are still alive
    pub(crate) fn len(&self) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|e| e.listener.strong_count() > 0)
            .count()
    }

    fn is_active(&self, handle: ListenerHandle) -> bool {
        lock(&self.entries)
            .iter()
            .any(|e| e.handle == handle && e.active)
    }

    /// Invoke `f` on every active listener.
    ///
    /// The listener list is snapshotted first, so listeners added by a
    /// callback miss this round. Registration is re-checked before each
    /// call, so listeners removed by a callback are skipped.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&dyn ChangeEventListener<S>)) {
        let snapshot: Vec<(ListenerHandle, Weak<dyn ChangeEventListener<S>>)> = lock(&self.entries)
            .iter()
            .filter(|e| e.active)
            .map(|e| (e.handle, e.listener.clone()))
            .collect();

        let mut dead = Vec::new();
        for (handle, weak) in snapshot {
            if !self.is_active(handle) {
                continue;
            }
            match weak.upgrade() {
                Some(listener) => f(listener.as_ref()),
                None => dead.push(handle),
            }
        }

        if !dead.is_empty() {
            lock(&self.entries).retain(|e| !dead.contains(&e.handle));
        }
    }

    /// Invoke `f` on a single registered listener, active or not
    pub(crate) fn deliver_to(
        &self,
        handle: ListenerHandle,
        f: impl FnOnce(&dyn ChangeEventListener<S>),
    ) {
        let weak = lock(&self.entries)
            .iter()
            .find(|e| e.handle == handle)
            .map(|e| e.listener.clone());
        if let Some(listener) = weak.and_then(|w| w.upgrade()) {
            f(listener.as_ref());
        }
    }

    /// Bring a pending listener up to date, then let it see live events
    ///
    /// Delivers one `Added` event per entry and, if the array already
    /// finished a load, `on_data_changed`.
    pub(crate) fn replay(&self, handle: ListenerHandle, entries: Vec<S>, synced: bool) {
        self.deliver_to(handle, |listener| {
            for (index, entry) in entries.into_iter().enumerate() {
                listener.on_child_changed(&ChangeEvent::added(entry, index));
            }
            if synced {
                listener.on_data_changed();
            }
        });
        self.activate(handle);
    }

    pub(crate) fn notify_child_changed(&self, event: &ChangeEvent<S>) {
        self.for_each(|listener| listener.on_child_changed(event));
    }

    pub(crate) fn notify_data_changed(&self) {
        self.for_each(|listener| listener.on_data_changed());
    }

    pub(crate) fn notify_error(&self, error: &ArrayError) {
        self.for_each(|listener| listener.on_error(error));
    }
}

impl<S> Default for ListenerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        name: &'static str,
        log: Arc<StdMutex<Vec<String>>>,
    }

    impl ChangeEventListener<u32> for Recorder {
        fn on_child_changed(&self, event: &ChangeEvent<u32>) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event.snapshot));
        }

        fn on_error(&self, error: &ArrayError) {
            self.log.lock().unwrap().push(format!("{}:{}", self.name, error));
        }
    }

    fn recorder(name: &'static str, log: &Arc<StdMutex<Vec<String>>>) -> Arc<Recorder> {
        Arc::new(Recorder {
            name,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_notifies_in_registration_order() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        let a = recorder("a", &log);
        let b = recorder("b", &log);
        registry.add(&b, true);
        registry.add(&a, true);

        registry.notify_child_changed(&ChangeEvent::added(7, 0));

        assert_eq!(*log.lock().unwrap(), vec!["b:7", "a:7"]);
    }

    #[test]
    fn test_removed_listener_not_invoked() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        let a = recorder("a", &log);
        let handle = registry.add(&a, true);

        assert!(registry.remove(handle));
        assert!(!registry.remove(handle));
        registry.notify_child_changed(&ChangeEvent::added(1, 0));

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        let a = recorder("a", &log);
        let handle = registry.add(&a, true);
        drop(a);

        assert_eq!(registry.len(), 0);
        registry.notify_data_changed();
        assert!(!registry.contains(handle));
    }

    #[test]
    fn test_inactive_listener_skips_live_events() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        let a = recorder("a", &log);
        let handle = registry.add(&a, false);

        registry.notify_child_changed(&ChangeEvent::added(1, 0));
        registry.deliver_to(handle, |l| l.on_child_changed(&ChangeEvent::added(9, 0)));
        registry.activate(handle);
        registry.notify_child_changed(&ChangeEvent::added(2, 1));

        assert_eq!(*log.lock().unwrap(), vec!["a:9", "a:2"]);
    }

    #[test]
    fn test_replay_then_activate() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        let a = recorder("a", &log);
        let handle = registry.add(&a, false);

        registry.replay(handle, vec![3, 4], true);
        registry.notify_child_changed(&ChangeEvent::added(5, 2));

        assert_eq!(*log.lock().unwrap(), vec!["a:3", "a:4", "a:5"]);
    }

    struct Remover {
        registry: Arc<ListenerRegistry<u32>>,
        victim: StdMutex<Option<ListenerHandle>>,
        late: StdMutex<Option<Arc<Recorder>>>,
    }

    impl ChangeEventListener<u32> for Remover {
        fn on_child_changed(&self, _event: &ChangeEvent<u32>) {
            if let Some(handle) = self.victim.lock().unwrap().take() {
                self.registry.remove(handle);
            }
            if let Some(late) = self.late.lock().unwrap().as_ref() {
                self.registry.add(late, true);
            }
        }

        fn on_error(&self, _error: &ArrayError) {}
    }

    #[test]
    fn test_mutation_during_dispatch() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let registry = Arc::new(ListenerRegistry::new());
        let victim = recorder("victim", &log);
        let late = recorder("late", &log);
        let remover = Arc::new(Remover {
            registry: Arc::clone(&registry),
            victim: StdMutex::new(None),
            late: StdMutex::new(Some(Arc::clone(&late))),
        });

        registry.add(&remover, true);
        let victim_handle = registry.add(&victim, true);
        *remover.victim.lock().unwrap() = Some(victim_handle);

        registry.notify_child_changed(&ChangeEvent::added(5, 0));

        // victim was removed mid-dispatch, late was added mid-dispatch
        assert!(log.lock().unwrap().is_empty());
        assert!(!registry.contains(victim_handle));

        *remover.late.lock().unwrap() = None;
        registry.notify_child_changed(&ChangeEvent::added(6, 0));
        assert_eq!(*log.lock().unwrap(), vec!["late:6"]);
    }
}
