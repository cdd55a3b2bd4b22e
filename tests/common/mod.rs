//! Shared helpers for the array integration tests

#![allow(dead_code)]

use firebase_ui_rust::common::KeyedSnapshot;
use firebase_ui_rust::{ArrayError, ChangeEvent, ChangeEventListener, ChangeEventType};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness. Filter with RUST_LOG.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A listener callback, flattened for assertions
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Child {
        event_type: ChangeEventType,
        key: String,
        new_index: Option<usize>,
        old_index: Option<usize>,
    },
    Data,
    Error(ArrayError),
}

impl Record {
    pub fn added(key: &str, index: usize) -> Self {
        Self::Child {
            event_type: ChangeEventType::Added,
            key: key.to_string(),
            new_index: Some(index),
            old_index: None,
        }
    }

    pub fn changed(key: &str, index: usize) -> Self {
        Self::Child {
            event_type: ChangeEventType::Changed,
            key: key.to_string(),
            new_index: Some(index),
            old_index: Some(index),
        }
    }

    pub fn removed(key: &str, index: usize) -> Self {
        Self::Child {
            event_type: ChangeEventType::Removed,
            key: key.to_string(),
            new_index: None,
            old_index: Some(index),
        }
    }

    pub fn moved(key: &str, new_index: usize, old_index: usize) -> Self {
        Self::Child {
            event_type: ChangeEventType::Moved,
            key: key.to_string(),
            new_index: Some(new_index),
            old_index: Some(old_index),
        }
    }
}

/// Listener that records every callback it receives
#[derive(Default)]
pub struct Recorder {
    records: Mutex<Vec<Record>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    /// Child events only
    pub fn children(&self) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| matches!(r, Record::Child { .. }))
            .collect()
    }

    pub fn errors(&self) -> Vec<ArrayError> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn data_changed_count(&self) -> usize {
        self.records().iter().filter(|r| **r == Record::Data).count()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

impl<S: KeyedSnapshot> ChangeEventListener<S> for Recorder {
    fn on_child_changed(&self, event: &ChangeEvent<S>) {
        self.records.lock().unwrap().push(Record::Child {
            event_type: event.event_type,
            key: event.snapshot.key().to_string(),
            new_index: event.new_index,
            old_index: event.old_index,
        });
    }

    fn on_data_changed(&self) {
        self.records.lock().unwrap().push(Record::Data);
    }

    fn on_error(&self, error: &ArrayError) {
        self.records.lock().unwrap().push(Record::Error(error.clone()));
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not met within 5s");
}
