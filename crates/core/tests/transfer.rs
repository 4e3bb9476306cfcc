//! End-to-end transfer behavior against the in-memory store

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use bp_core::{MemoryStore, Transfer, TransferOptions};

fn transfer(store: &Arc<MemoryStore>) -> Transfer {
    Transfer::new(store.clone(), TransferOptions::default())
}

fn seeded(bucket: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::with_buckets(&[bucket, "restore"]));
    let mut meta = BTreeMap::new();
    meta.insert("owner".to_string(), "ops".to_string());
    store.insert_with(bucket, "a.txt", "hello", "text/plain", meta);
    store.insert(bucket, "dir/b.txt", "goodbye");
    store
}

#[tokio::test]
async fn archive_round_trip_preserves_objects() {
    let store = seeded("src");
    let engine = transfer(&store);
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("backup.tar.gz");

    let report = engine.export_bucket("src", &archive, "", None).await.unwrap();
    assert_eq!(report.result.succeeded, 2);

    let result = engine.import_bucket("restore", &archive, true, None).await.unwrap();
    assert_eq!((result.succeeded, result.skipped, result.failed), (2, 0, 0));

    for key in ["a.txt", "dir/b.txt"] {
        let original = store.object("src", key).unwrap();
        let restored = store.object("restore", key).unwrap();
        assert_eq!(restored.data, original.data, "{key}");
        assert_eq!(restored.content_type, original.content_type, "{key}");
        assert_eq!(restored.metadata, original.metadata, "{key}");
    }
    assert_eq!(store.object("restore", "a.txt").unwrap().data.len(), 5);
    assert_eq!(store.object("restore", "dir/b.txt").unwrap().data.len(), 7);
}

#[tokio::test]
async fn directory_round_trip_preserves_objects() {
    let store = seeded("src");
    let engine = transfer(&store);
    let dir = tempfile::tempdir().unwrap();

    engine
        .export_to_directory("src", dir.path(), "", None)
        .await
        .unwrap();
    let result = engine
        .import_from_directory("restore", dir.path(), "", true, None)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 2);
    assert_eq!(store.keys("restore"), vec!["a.txt", "dir/b.txt"]);
    let restored = store.object("restore", "a.txt").unwrap();
    assert_eq!(restored.content_type, "text/plain");
    assert_eq!(restored.metadata.get("owner").map(String::as_str), Some("ops"));
}

#[tokio::test]
async fn failed_object_is_left_out_of_manifest() {
    let store = seeded("src");
    store.insert("src", "broken", "x");
    store.fail_get("broken");
    let engine = transfer(&store);
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("backup.tar.gz");

    let report = engine.export_bucket("src", &archive, "", None).await.unwrap();

    assert_eq!(report.result.failed, 1);
    assert_eq!(report.result.failures[0].key, "broken");
    let keys: Vec<_> = report.manifest.objects.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["a.txt", "dir/b.txt"]);
    assert_eq!(report.manifest.total_objects, report.manifest.objects.len() as u64);
    assert_eq!(
        report.manifest.total_size,
        report.manifest.objects.iter().map(|e| e.size).sum::<u64>()
    );

    let result = engine.import_bucket("restore", &archive, true, None).await.unwrap();
    assert_eq!(result.succeeded, 2);
    assert!(store.object("restore", "broken").is_none());
}

#[tokio::test]
async fn import_without_overwrite_keeps_existing_objects() {
    let store = seeded("src");
    store.insert("restore", "a.txt", "local edit");
    let engine = transfer(&store);
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("backup.tar.gz");

    engine.export_bucket("src", &archive, "", None).await.unwrap();
    let result = engine.import_bucket("restore", &archive, false, None).await.unwrap();

    assert_eq!((result.succeeded, result.skipped), (1, 1));
    assert_eq!(store.object("restore", "a.txt").unwrap().data, b"local edit");
}

#[tokio::test]
async fn export_respects_prefix_across_pages() {
    let store = Arc::new(MemoryStore::with_buckets(&["src"]));
    for i in 0..25 {
        store.insert("src", &format!("logs/{i:02}"), format!("line {i}"));
    }
    store.insert("src", "other", "skip me");
    let engine = Transfer::new(
        store.clone(),
        TransferOptions {
            page_size: 4,
            max_workers: 3,
        },
    );
    let dir = tempfile::tempdir().unwrap();

    let report = engine
        .export_bucket("src", &dir.path().join("logs.tar.gz"), "logs/", None)
        .await
        .unwrap();

    assert_eq!(report.manifest.total_objects, 25);
    let keys: Vec<_> = report.manifest.objects.iter().map(|e| e.key.clone()).collect();
    let expected: Vec<_> = (0..25).map(|i| format!("logs/{i:02}")).collect();
    assert_eq!(keys, expected);
}

#[tokio::test]
async fn sync_is_idempotent_and_gates_orphans() {
    let store = Arc::new(MemoryStore::with_buckets(&["a", "b"]));
    store.insert("a", "x", "1");
    store.insert("a", "y", "2");
    store.insert("b", "orphan", "3");
    let engine = transfer(&store);

    let first = engine.sync_buckets("a", "b", "", false, None).await.unwrap();
    assert_eq!(first.succeeded, 2);
    assert_eq!(store.keys("b"), vec!["orphan", "x", "y"]);

    let second = engine.sync_buckets("a", "b", "", false, None).await.unwrap();
    assert_eq!(second.succeeded, 0);

    let plan = engine.plan_sync("a", "b", "", true).await.unwrap();
    assert_eq!(plan.delete, vec!["orphan"]);
    assert!(plan.copy.is_empty());
    assert_eq!(store.keys("b"), vec!["orphan", "x", "y"], "planning changes nothing");

    let third = engine.sync_buckets("a", "b", "", true, None).await.unwrap();
    assert_eq!(third.deleted, 1);
    assert_eq!(store.keys("b"), vec!["x", "y"]);
}

#[tokio::test]
async fn progress_reaches_total() {
    let store = seeded("src");
    let engine = transfer(&store);
    let dir = tempfile::tempdir().unwrap();
    let seen = Mutex::new(Vec::new());
    let callback = |done: u64, total: u64| seen.lock().unwrap().push((done, total));

    engine
        .export_bucket("src", &dir.path().join("p.tar.gz"), "", Some(&callback))
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
}

#[tokio::test]
async fn import_progress_counts_skipped_members() {
    let store = seeded("src");
    store.insert("restore", "a.txt", "already here");
    let engine = transfer(&store);
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("p.tar.gz");
    engine.export_bucket("src", &archive, "", None).await.unwrap();

    let seen = Mutex::new(Vec::new());
    let callback = |done: u64, total: u64| seen.lock().unwrap().push((done, total));
    let result = engine
        .import_bucket("restore", &archive, false, Some(&callback))
        .await
        .unwrap();

    assert_eq!((result.succeeded, result.skipped), (1, 1));
    assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
}

#[tokio::test]
async fn directory_import_progress_reaches_total() {
    let store = seeded("src");
    let engine = transfer(&store);
    let dir = tempfile::tempdir().unwrap();
    engine
        .export_to_directory("src", dir.path(), "", None)
        .await
        .unwrap();

    let seen = Mutex::new(Vec::new());
    let callback = |done: u64, total: u64| seen.lock().unwrap().push((done, total));
    engine
        .import_from_directory("restore", dir.path(), "", true, Some(&callback))
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(1, 2), (2, 2)]);
}
