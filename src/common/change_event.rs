//! Change events emitted by observable snapshot arrays

/// Kind of change applied to an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEventType {
    /// An entry was inserted
    Added,
    /// An entry was updated in place
    Changed,
    /// An entry was removed
    Removed,
    /// An entry moved to a new position (and may also have been updated)
    Moved,
}

/// A single-step edit that brings a rendered list in line with the array
///
/// | type      | `new_index` | `old_index` |
/// |-----------|-------------|-------------|
/// | `Added`   | `Some(i)`   | `None`      |
/// | `Changed` | `Some(i)`   | `Some(i)`   |
/// | `Removed` | `None`      | `Some(i)`   |
/// | `Moved`   | `Some(new)` | `Some(old)` |
///
/// `snapshot` is the entry after the change; for `Removed` it is the last
/// value the array held.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<S> {
    /// Type of change
    pub event_type: ChangeEventType,

    /// The entry that changed
    pub snapshot: S,

    /// Index of the entry after the change
    pub new_index: Option<usize>,

    /// Index of the entry before the change
    pub old_index: Option<usize>,
}

impl<S> ChangeEvent<S> {
    /// Entry inserted at `index`
    pub fn added(snapshot: S, index: usize) -> Self {
        Self {
            event_type: ChangeEventType::Added,
            snapshot,
            new_index: Some(index),
            old_index: None,
        }
    }

    /// Entry at `index` updated in place
    pub fn changed(snapshot: S, index: usize) -> Self {
        Self {
            event_type: ChangeEventType::Changed,
            snapshot,
            new_index: Some(index),
            old_index: Some(index),
        }
    }

    /// Entry removed from `index`
    pub fn removed(snapshot: S, index: usize) -> Self {
        Self {
            event_type: ChangeEventType::Removed,
            snapshot,
            new_index: None,
            old_index: Some(index),
        }
    }

    /// Entry moved from `old_index` to `new_index`
    pub fn moved(snapshot: S, new_index: usize, old_index: usize) -> Self {
        Self {
            event_type: ChangeEventType::Moved,
            snapshot,
            new_index: Some(new_index),
            old_index: Some(old_index),
        }
    }

    /// Index a list renderer should touch: the new index, or the old one for removals
    pub fn index(&self) -> usize {
        self.new_index.or(self.old_index).unwrap_or_default()
    }

    /// Replace the snapshot, keeping type and indices
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> ChangeEvent<T> {
        ChangeEvent {
            event_type: self.event_type,
            snapshot: f(self.snapshot),
            new_index: self.new_index,
            old_index: self.old_index,
        }
    }
}
