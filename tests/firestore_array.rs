//! Integration tests for FirestoreArray
//!
//! Push hand-built query snapshots through a `SnapshotFeed`.

mod common;

use common::{init_tracing, Record, Recorder};
use firebase_ui_rust::firestore::{
    DocumentChange, DocumentSnapshot, FirestoreArray, MetadataChanges, QuerySnapshot,
    SnapshotFeed, SnapshotMetadata,
};
use firebase_ui_rust::{ArrayError, FirestoreError, ObservableSnapshotArray};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn doc(id: &str, rank: i64) -> DocumentSnapshot {
    DocumentSnapshot::new(id, json!({ "title": id, "rank": rank }))
}

fn ids(array: &FirestoreArray) -> Vec<String> {
    array.snapshots().iter().map(|d| d.id().to_string()).collect()
}

fn snapshot(changes: Vec<DocumentChange>) -> QuerySnapshot {
    QuerySnapshot {
        changes,
        ..Default::default()
    }
}

async fn loaded(feed: &Arc<SnapshotFeed>) -> (FirestoreArray, Arc<Recorder>) {
    let array = FirestoreArray::new(feed.clone());
    let recorder = Recorder::new();
    array.add_listener(&recorder);
    assert_ok!(array.start());
    feed.push(snapshot(vec![
        DocumentChange::added(doc("a", 1), 0),
        DocumentChange::added(doc("b", 2), 1),
        DocumentChange::added(doc("c", 3), 2),
    ]));
    assert_ok!(array.sync().await);
    (array, recorder)
}

/// Test: the first snapshot loads every document, then on_data_changed
#[tokio::test]
async fn test_initial_snapshot() {
    init_tracing();
    let feed = Arc::new(SnapshotFeed::new());
    let (array, recorder) = loaded(&feed).await;

    assert_eq!(ids(&array), vec!["a", "b", "c"]);
    assert_eq!(
        recorder.records(),
        vec![
            Record::added("a", 0),
            Record::added("b", 1),
            Record::added("c", 2),
            Record::Data,
        ]
    );
    assert_eq!(array.index_of_key("c"), Some(2));
}

/// Test: a document modified and moved in one change yields a single move
#[tokio::test]
async fn test_modified_and_moved() {
    init_tracing();
    let feed = Arc::new(SnapshotFeed::new());
    let (array, recorder) = loaded(&feed).await;
    recorder.clear();

    feed.push(snapshot(vec![DocumentChange::modified(doc("a", 9), 0, 2)]));
    assert_ok!(array.sync().await);

    assert_eq!(recorder.children(), vec![Record::moved("a", 2, 0)]);
    assert_eq!(ids(&array), vec!["b", "c", "a"]);
    assert_eq!(array.get(2).unwrap().get("rank"), Some(&json!(9)));
}

/// Test: modifications in place and removals
#[tokio::test]
async fn test_modify_and_remove() {
    init_tracing();
    let feed = Arc::new(SnapshotFeed::new());
    let (array, recorder) = loaded(&feed).await;
    recorder.clear();

    feed.push(snapshot(vec![
        DocumentChange::modified(doc("b", 20), 1, 1),
        DocumentChange::removed(doc("a", 1), 0),
    ]));
    assert_ok!(array.sync().await);

    assert_eq!(
        recorder.records(),
        vec![Record::changed("b", 1), Record::removed("a", 0), Record::Data]
    );
    assert_eq!(ids(&array), vec!["b", "c"]);
}

/// Test: changes that contradict the local list are skipped
#[tokio::test]
async fn test_inconsistent_change_skipped() {
    init_tracing();
    let feed = Arc::new(SnapshotFeed::new());
    let (array, recorder) = loaded(&feed).await;
    recorder.clear();

    feed.push(snapshot(vec![
        DocumentChange::removed(doc("zz", 0), 1),
        DocumentChange::added(doc("d", 4), 3),
    ]));
    assert_ok!(array.sync().await);

    assert_eq!(recorder.children(), vec![Record::added("d", 3)]);
    assert_eq!(array.len(), 4);
}

/// Test: metadata-only snapshots are delivered only when requested
#[tokio::test]
async fn test_metadata_changes() {
    init_tracing();
    let feed = Arc::new(SnapshotFeed::new());
    let array = FirestoreArray::with_metadata_changes(feed.clone(), MetadataChanges::Include);
    let recorder = Recorder::new();
    array.add_listener(&recorder);
    assert_ok!(array.start());

    feed.push(QuerySnapshot {
        metadata: SnapshotMetadata {
            has_pending_writes: false,
            is_from_cache: true,
        },
        ..Default::default()
    });
    assert_ok!(array.sync().await);
    assert_eq!(recorder.records(), vec![Record::Data]);

    let (plain, plain_recorder) = loaded(&feed).await;
    plain_recorder.clear();
    feed.push(QuerySnapshot::default());
    assert_ok!(plain.sync().await);
    assert!(plain_recorder.records().is_empty());
}

/// Test: a failed query is reported as a fatal error and keeps its data
#[tokio::test]
async fn test_query_error() {
    init_tracing();
    let feed = Arc::new(SnapshotFeed::new());
    let (array, recorder) = loaded(&feed).await;

    feed.fail(FirestoreError::PermissionDenied);
    assert_ok!(array.sync().await);

    assert_eq!(
        recorder.errors(),
        vec![ArrayError::SourceCancelled(FirestoreError::PermissionDenied.into())]
    );
    assert!(array.is_cancelled());
    assert_eq!(array.len(), 3);
}

/// Test: lifecycle and replay mirror the database arrays
#[tokio::test]
async fn test_lifecycle_and_replay() {
    init_tracing();
    let feed = Arc::new(SnapshotFeed::new());
    let (array, _recorder) = loaded(&feed).await;
    assert_eq!(assert_err!(array.start()), ArrayError::AlreadyListening);

    let late = Recorder::new();
    array.add_listener(&late);
    assert_ok!(array.sync().await);
    assert_eq!(
        late.records(),
        vec![
            Record::added("a", 0),
            Record::added("b", 1),
            Record::added("c", 2),
            Record::Data,
        ]
    );

    array.stop();
    array.stop();
    assert!(array.is_empty());
    assert_eq!(feed.subscriber_count(), 0);
}

#[derive(Debug, Deserialize)]
struct Post {
    title: String,
    rank: i64,
}

/// Test: documents deserialize into model types
#[tokio::test]
async fn test_objects() {
    let feed = Arc::new(SnapshotFeed::new());
    let (array, _recorder) = loaded(&feed).await;

    let posts: Vec<Post> = array.objects().unwrap();
    assert_eq!(posts.len(), 3);
    assert_eq!(posts[1].title, "b");
    assert_eq!(posts[2].rank, 3);
}
