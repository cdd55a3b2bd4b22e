//! Ordering of Realtime Database children
//!
//! Children are ordered by `(priority, key)`:
//! - numeric priorities compare numerically and sort first
//! - string priorities compare lexically and sort after numbers
//! - null priorities sort last; two null priorities compare equal, so
//!   null-priority children keep the order in which they arrived
//! - equal non-null priorities tie-break by key

use super::data_snapshot::DataSnapshot;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Ordering token attached to a child
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Priority {
    /// Numeric priority
    Number(f64),
    /// String priority
    String(String),
    /// No priority
    #[default]
    Null,
}

impl Priority {
    /// Check if the child has no priority
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::String(_) => 1,
            Self::Null => 2,
        }
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl From<f64> for Priority {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for Priority {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Priority>> From<Option<T>> for Priority {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Total order over children, by priority then key
///
/// Pure function of its inputs. Returns `Equal` only for two null-priority
/// children (or a child compared with itself).
pub fn compare(a: &DataSnapshot, b: &DataSnapshot) -> Ordering {
    match a.priority().cmp(b.priority()) {
        Ordering::Equal if a.priority().is_null() => Ordering::Equal,
        Ordering::Equal => a.key().cmp(b.key()),
        other => other,
    }
}
