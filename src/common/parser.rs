//! Conversion of snapshots into model objects

use crate::error::ArrayError;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// A snapshot with a unique key and an optional JSON payload
pub trait KeyedSnapshot: Clone + Send + Sync + 'static {
    /// Key that identifies the snapshot within its array
    fn key(&self) -> &str;

    /// JSON payload, `None` if the snapshot holds no data
    fn json_value(&self) -> Option<&serde_json::Value>;
}

/// Converts snapshots of type `S` into model objects of type `T`
///
/// Implemented for every `Fn(&S) -> Result<T, ArrayError>`.
pub trait SnapshotParser<S, T>: Send + Sync {
    /// Convert a snapshot
    fn parse_snapshot(&self, snapshot: &S) -> Result<T, ArrayError>;
}

impl<S, T, F> SnapshotParser<S, T> for F
where
    F: Fn(&S) -> Result<T, ArrayError> + Send + Sync,
{
    fn parse_snapshot(&self, snapshot: &S) -> Result<T, ArrayError> {
        self(snapshot)
    }
}

/// Parser that deserializes the snapshot payload with serde
///
/// # Example
/// ```
/// use firebase_ui_rust::common::{ClassSnapshotParser, SnapshotParser};
/// use firebase_ui_rust::database::DataSnapshot;
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct Chat { name: String }
///
/// let snapshot = DataSnapshot::new("c1", json!({ "name": "Ada" }));
/// let chat: Chat = ClassSnapshotParser::new().parse_snapshot(&snapshot).unwrap();
/// assert_eq!(chat.name, "Ada");
/// ```
pub struct ClassSnapshotParser<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> ClassSnapshotParser<T> {
    /// Create a parser for `T`
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ClassSnapshotParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, T> SnapshotParser<S, T> for ClassSnapshotParser<T>
where
    S: KeyedSnapshot,
    T: DeserializeOwned,
{
    fn parse_snapshot(&self, snapshot: &S) -> Result<T, ArrayError> {
        let value = snapshot
            .json_value()
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        serde_json::from_value(value).map_err(|e| ArrayError::parse(snapshot.key(), e))
    }
}

/// Parser that yields the snapshot key
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyParser;

impl<S: KeyedSnapshot> SnapshotParser<S, String> for KeyParser {
    fn parse_snapshot(&self, snapshot: &S) -> Result<String, ArrayError> {
        Ok(snapshot.key().to_string())
    }
}
