//! Realtime Database child snapshot

use super::priority::Priority;
use crate::common::KeyedSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable copy of a child at a database location
///
/// Holds the child's key, its ordering priority and its JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    key: String,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    value: Value,
}

impl DataSnapshot {
    /// Snapshot without a priority
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self::with_priority(key, Priority::Null, value)
    }

    /// Snapshot with a priority
    pub fn with_priority(key: impl Into<String>, priority: impl Into<Priority>, value: Value) -> Self {
        Self {
            key: key.into(),
            priority: priority.into(),
            value,
        }
    }

    /// Child key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Ordering priority
    pub fn priority(&self) -> &Priority {
        &self.priority
    }

    /// JSON value (`Null` if the child does not exist)
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Check if the child holds data
    pub fn exists(&self) -> bool {
        !self.value.is_null()
    }

    /// Get a nested value by slash-separated path
    pub fn child(&self, path: &str) -> Option<&Value> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.value, |value, segment| value.get(segment))
    }

    /// Copy of this snapshot with a new priority
    pub fn into_priority(self, priority: impl Into<Priority>) -> Self {
        Self {
            priority: priority.into(),
            ..self
        }
    }
}

impl KeyedSnapshot for DataSnapshot {
    fn key(&self) -> &str {
        &self.key
    }

    fn json_value(&self) -> Option<&Value> {
        self.exists().then_some(&self.value)
    }
}
