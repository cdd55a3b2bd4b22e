//! Ordered snapshot list and the child-event reducer
//!
//! [`SnapshotList`] keeps a `Vec` of children sorted by [`compare`] and a
//! key to index map in lockstep. [`SnapshotList::apply`] folds one remote
//! child event into the list and returns the single [`ChangeEvent`] a
//! rendered list needs to stay in sync.
//!
//! `previous_child_key` hints are only trusted when they agree with
//! [`compare`]; otherwise the position comes from a binary search.

use super::data_snapshot::DataSnapshot;
use super::priority::compare;
use crate::common::ChangeEvent;
use crate::error::ArrayError;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// A child event delivered by a Realtime Database listener
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    /// A child was added after `previous_child_key` (`None`: no hint)
    Added {
        /// The new child
        snapshot: DataSnapshot,
        /// Key of the sibling the child follows
        previous_child_key: Option<String>,
    },
    /// A child's value or priority changed
    Changed {
        /// The updated child
        snapshot: DataSnapshot,
        /// Key of the sibling the child follows
        previous_child_key: Option<String>,
    },
    /// A child was removed
    Removed {
        /// The removed child
        snapshot: DataSnapshot,
    },
    /// A child moved to follow `previous_child_key`
    Moved {
        /// The moved child
        snapshot: DataSnapshot,
        /// Key of the sibling the child now follows
        previous_child_key: Option<String>,
    },
}

impl ChildEvent {
    /// Key of the child the event refers to
    pub fn key(&self) -> &str {
        match self {
            Self::Added { snapshot, .. }
            | Self::Changed { snapshot, .. }
            | Self::Removed { snapshot }
            | Self::Moved { snapshot, .. } => snapshot.key(),
        }
    }
}

/// Children of a location in `(priority, key)` order, with key lookup
#[derive(Debug, Clone, Default)]
pub struct SnapshotList {
    snapshots: Vec<DataSnapshot>,
    index: HashMap<String, usize>,
}

impl SnapshotList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of children
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Child at `index`
    pub fn get(&self, index: usize) -> Option<&DataSnapshot> {
        self.snapshots.get(index)
    }

    /// Index of the child with `key`
    pub fn index_of_key(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Iterate children in order
    pub fn iter(&self) -> std::slice::Iter<'_, DataSnapshot> {
        self.snapshots.iter()
    }

    /// Children in order
    pub fn as_slice(&self) -> &[DataSnapshot] {
        &self.snapshots
    }

    /// Remove every child
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.index.clear();
    }

    /// Apply one child event and report the resulting change
    ///
    /// - `Added` for a key already present is applied as `Changed`.
    /// - `Changed` that moves the child yields one `Moved` event.
    /// - `Moved` that leaves the child in place yields `Changed`.
    /// - Events for unknown keys leave the list untouched and return
    ///   [`ArrayError::UnknownKey`].
    pub fn apply(&mut self, event: ChildEvent) -> Result<ChangeEvent<DataSnapshot>, ArrayError> {
        match event {
            ChildEvent::Added {
                snapshot,
                previous_child_key,
            } => {
                if self.index.contains_key(snapshot.key()) {
                    debug!(key = snapshot.key(), "duplicate child added, applying as change");
                    return self.update(snapshot, previous_child_key.as_deref());
                }
                let index = self.insertion_index(&snapshot, previous_child_key.as_deref());
                self.insert(index, snapshot.clone());
                Ok(ChangeEvent::added(snapshot, index))
            }
            ChildEvent::Changed {
                snapshot,
                previous_child_key,
            } => self.update(snapshot, previous_child_key.as_deref()),
            ChildEvent::Removed { snapshot } => {
                let index = self.require(snapshot.key(), "removed")?;
                let removed = self.remove(index);
                Ok(ChangeEvent::removed(removed, index))
            }
            ChildEvent::Moved {
                snapshot,
                previous_child_key,
            } => {
                let old_index = self.require(snapshot.key(), "moved")?;
                self.remove(old_index);
                let new_index = self.insertion_index(&snapshot, previous_child_key.as_deref());
                self.insert(new_index, snapshot.clone());
                if new_index == old_index {
                    Ok(ChangeEvent::changed(snapshot, new_index))
                } else {
                    Ok(ChangeEvent::moved(snapshot, new_index, old_index))
                }
            }
        }
    }

    fn update(
        &mut self,
        snapshot: DataSnapshot,
        previous_child_key: Option<&str>,
    ) -> Result<ChangeEvent<DataSnapshot>, ArrayError> {
        let old_index = self.require(snapshot.key(), "changed")?;
        self.remove(old_index);

        if self.fits_at(old_index, &snapshot) {
            self.insert(old_index, snapshot.clone());
            return Ok(ChangeEvent::changed(snapshot, old_index));
        }

        let new_index = self.insertion_index(&snapshot, previous_child_key);
        self.insert(new_index, snapshot.clone());
        Ok(ChangeEvent::moved(snapshot, new_index, old_index))
    }

    fn require(&self, key: &str, event: &'static str) -> Result<usize, ArrayError> {
        self.index_of_key(key).ok_or_else(|| ArrayError::UnknownKey {
            key: key.to_string(),
            event,
        })
    }

    /// Position for a child not currently in the list
    fn insertion_index(&self, snapshot: &DataSnapshot, previous_child_key: Option<&str>) -> usize {
        if let Some(previous) = previous_child_key {
            if let Some(candidate) = self.index_of_key(previous).map(|i| i + 1) {
                if self.fits_at(candidate, snapshot) {
                    return candidate;
                }
                debug!(
                    key = snapshot.key(),
                    previous, "previous child hint disagrees with ordering, using binary search"
                );
            }
        }
        // Upper bound keeps arrival order among equal (null-priority) children
        self.snapshots
            .partition_point(|existing| compare(existing, snapshot) != Ordering::Greater)
    }

    /// Check if inserting at `index` keeps the list sorted
    fn fits_at(&self, index: usize, snapshot: &DataSnapshot) -> bool {
        if index > self.snapshots.len() {
            return false;
        }
        let after_previous = index == 0
            || compare(&self.snapshots[index - 1], snapshot) != Ordering::Greater;
        let before_next = index == self.snapshots.len()
            || compare(snapshot, &self.snapshots[index]) != Ordering::Greater;
        after_previous && before_next
    }

    fn insert(&mut self, index: usize, snapshot: DataSnapshot) {
        self.snapshots.insert(index, snapshot);
        self.reindex_from(index);
    }

    fn remove(&mut self, index: usize) -> DataSnapshot {
        let removed = self.snapshots.remove(index);
        self.index.remove(removed.key());
        self.reindex_from(index);
        removed
    }

    fn reindex_from(&mut self, start: usize) {
        for (offset, snapshot) in self.snapshots[start..].iter().enumerate() {
            self.index.insert(snapshot.key().to_string(), start + offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ChangeEventType;
    use crate::database::priority::Priority;
    use serde_json::json;

    fn snap(key: &str, priority: impl Into<Priority>) -> DataSnapshot {
        DataSnapshot::with_priority(key, priority, json!({ "name": key }))
    }

    fn added(key: &str, priority: impl Into<Priority>) -> ChildEvent {
        ChildEvent::Added {
            snapshot: snap(key, priority),
            previous_child_key: None,
        }
    }

    fn keys(list: &SnapshotList) -> Vec<&str> {
        list.iter().map(|s| s.key()).collect()
    }

    fn assert_consistent(list: &SnapshotList) {
        for (i, snapshot) in list.iter().enumerate() {
            assert_eq!(list.index_of_key(snapshot.key()), Some(i));
        }
        assert_eq!(list.index.len(), list.len());
        for pair in list.as_slice().windows(2) {
            assert_ne!(compare(&pair[0], &pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn test_scenario_add_change_remove() {
        let mut list = SnapshotList::new();
        for (key, priority) in [("k1", 1), ("k2", 2), ("k3", 3)] {
            list.apply(added(key, priority)).unwrap();
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0).unwrap().key(), "k1");

        let moved = list
            .apply(ChildEvent::Changed {
                snapshot: snap("k1", 5),
                previous_child_key: None,
            })
            .unwrap();
        assert_eq!(moved.event_type, ChangeEventType::Moved);
        assert_eq!((moved.old_index, moved.new_index), (Some(0), Some(2)));
        assert_eq!(keys(&list), vec!["k2", "k3", "k1"]);

        let removed = list
            .apply(ChildEvent::Removed {
                snapshot: snap("k2", 2),
            })
            .unwrap();
        assert_eq!(removed.event_type, ChangeEventType::Removed);
        assert_eq!(removed.old_index, Some(0));
        assert_eq!(list.len(), 2);
        assert_consistent(&list);
    }

    #[test]
    fn test_change_in_place() {
        let mut list = SnapshotList::new();
        list.apply(added("a", 1)).unwrap();
        list.apply(added("b", 2)).unwrap();

        let updated = DataSnapshot::with_priority("a", 1, json!("new"));
        let event = list
            .apply(ChildEvent::Changed {
                snapshot: updated.clone(),
                previous_child_key: None,
            })
            .unwrap();

        assert_eq!(event, ChangeEvent::changed(updated, 0));
        assert_eq!(list.get(0).unwrap().value(), &json!("new"));
    }

    #[test]
    fn test_insert_out_of_order_sorts() {
        let mut list = SnapshotList::new();
        let event = list.apply(added("c", 3)).unwrap();
        assert_eq!(event.new_index, Some(0));
        let event = list.apply(added("a", 1)).unwrap();
        assert_eq!(event.new_index, Some(0));
        let event = list.apply(added("b", 2)).unwrap();
        assert_eq!(event.new_index, Some(1));
        list.apply(added("s", "str")).unwrap();
        list.apply(added("n", None::<i32>)).unwrap();

        assert_eq!(keys(&list), vec!["a", "b", "c", "s", "n"]);
        assert_consistent(&list);
    }

    #[test]
    fn test_duplicate_add_is_change() {
        let mut list = SnapshotList::new();
        list.apply(added("a", 1)).unwrap();
        let event = list.apply(added("a", 1)).unwrap();

        assert_eq!(event.event_type, ChangeEventType::Changed);
        assert_eq!(list.len(), 1);
        assert_consistent(&list);
    }

    #[test]
    fn test_unknown_key_is_rejected_without_mutation() {
        let mut list = SnapshotList::new();
        list.apply(added("a", 1)).unwrap();

        let err = list
            .apply(ChildEvent::Removed {
                snapshot: snap("ghost", 1),
            })
            .unwrap_err();
        assert_eq!(
            err,
            ArrayError::UnknownKey {
                key: "ghost".to_string(),
                event: "removed"
            }
        );
        assert!(list
            .apply(ChildEvent::Changed {
                snapshot: snap("ghost", 1),
                previous_child_key: None
            })
            .is_err());
        assert_eq!(keys(&list), vec!["a"]);
    }

    #[test]
    fn test_null_priorities_keep_arrival_order() {
        let mut list = SnapshotList::new();
        for key in ["z", "m", "a"] {
            list.apply(added(key, None::<i32>)).unwrap();
        }
        assert_eq!(keys(&list), vec!["z", "m", "a"]);

        // A payload update must not shuffle the equal-priority group
        let event = list
            .apply(ChildEvent::Changed {
                snapshot: DataSnapshot::new("z", json!(42)),
                previous_child_key: None,
            })
            .unwrap();
        assert_eq!(event.event_type, ChangeEventType::Changed);
        assert_eq!(keys(&list), vec!["z", "m", "a"]);
    }

    #[test]
    fn test_previous_child_hint_places_within_null_group() {
        let mut list = SnapshotList::new();
        list.apply(added("a", None::<i32>)).unwrap();
        list.apply(added("b", None::<i32>)).unwrap();

        let event = list
            .apply(ChildEvent::Added {
                snapshot: DataSnapshot::new("c", json!(1)),
                previous_child_key: Some("a".to_string()),
            })
            .unwrap();
        assert_eq!(event.new_index, Some(1));
        assert_eq!(keys(&list), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_inconsistent_hint_falls_back_to_binary_search() {
        let mut list = SnapshotList::new();
        list.apply(added("a", 1)).unwrap();
        list.apply(added("b", 2)).unwrap();

        let event = list
            .apply(ChildEvent::Added {
                snapshot: snap("c", 0),
                previous_child_key: Some("b".to_string()),
            })
            .unwrap();
        assert_eq!(event.new_index, Some(0));
        assert_consistent(&list);
    }

    #[test]
    fn test_moved_event() {
        let mut list = SnapshotList::new();
        for (key, priority) in [("a", 1), ("b", 2), ("c", 3)] {
            list.apply(added(key, priority)).unwrap();
        }

        let event = list
            .apply(ChildEvent::Moved {
                snapshot: snap("c", 0),
                previous_child_key: None,
            })
            .unwrap();
        assert_eq!(event, ChangeEvent::moved(snap("c", 0), 0, 2));

        let event = list
            .apply(ChildEvent::Moved {
                snapshot: snap("c", 0),
                previous_child_key: None,
            })
            .unwrap();
        assert_eq!(event.event_type, ChangeEventType::Changed);
        assert_eq!(keys(&list), vec!["c", "a", "b"]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Set(u8, Option<i8>),
            Remove(u8),
        }

        fn arb_op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..12, proptest::option::of(-5i8..5)).prop_map(|(k, p)| Op::Set(k, p)),
                (0u8..12).prop_map(Op::Remove),
            ]
        }

        proptest! {
            #[test]
            fn prop_sorted_and_sized_after_every_event(ops in proptest::collection::vec(arb_op(), 0..60)) {
                let mut list = SnapshotList::new();
                let mut present = std::collections::HashSet::new();

                for op in ops {
                    match op {
                        Op::Set(k, p) => {
                            let key = format!("k{}", k);
                            let snapshot = DataSnapshot::with_priority(&key, p.map(i32::from), json!(k));
                            let event = if present.contains(&key) {
                                ChildEvent::Changed { snapshot, previous_child_key: None }
                            } else {
                                ChildEvent::Added { snapshot, previous_child_key: None }
                            };
                            let change = list.apply(event).unwrap();
                            prop_assert_ne!(change.event_type, ChangeEventType::Removed);
                            present.insert(key);
                        }
                        Op::Remove(k) => {
                            let key = format!("k{}", k);
                            let result = list.apply(ChildEvent::Removed {
                                snapshot: DataSnapshot::new(&key, json!(null)),
                            });
                            prop_assert_eq!(result.is_ok(), present.remove(&key));
                        }
                    }
                    prop_assert_eq!(list.len(), present.len());
                    for pair in list.as_slice().windows(2) {
                        prop_assert_ne!(compare(&pair[0], &pair[1]), Ordering::Greater);
                    }
                    for (i, snapshot) in list.iter().enumerate() {
                        prop_assert_eq!(list.index_of_key(snapshot.key()), Some(i));
                    }
                }
            }

            #[test]
            fn prop_insertion_order_does_not_matter(priorities in proptest::collection::vec(-50i32..50, 1..30)) {
                let entries: Vec<DataSnapshot> = priorities
                    .iter()
                    .enumerate()
                    .map(|(i, p)| DataSnapshot::with_priority(format!("k{:02}", i), *p, json!(i)))
                    .collect();

                let mut shuffled = SnapshotList::new();
                for snapshot in entries.iter().rev() {
                    shuffled.apply(ChildEvent::Added { snapshot: snapshot.clone(), previous_child_key: None }).unwrap();
                }

                let mut sorted_entries = entries.clone();
                sorted_entries.sort_by(compare);
                let mut sorted = SnapshotList::new();
                for snapshot in sorted_entries {
                    sorted.apply(ChildEvent::Added { snapshot, previous_child_key: None }).unwrap();
                }

                prop_assert_eq!(shuffled.as_slice(), sorted.as_slice());
            }
        }
    }
}
