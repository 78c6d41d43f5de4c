//! End-to-end tests for the SQLite event source
//!
//! Runs the store against an on-disk database:
//! - Live pushes for local and external writes
//! - Persistence of mutations across reopen
//! - Chunked fan-out into the database

mod common;

use common::{distinct_unread, record, OTHER_USER, TEST_USER, WAIT_TIMEOUT_SECS};
use notification_engine::config::EngineSettings;
use notification_engine::listener::ListenerState;
use notification_engine::{
    EventSource, FanoutPayload, NotificationStore, NotificationType, NotificationsSnapshot,
    SqliteEventSource, StaticIdentity,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn open_source(dir: &TempDir) -> Arc<SqliteEventSource> {
    Arc::new(SqliteEventSource::open(&db_path(dir), POLL_INTERVAL).unwrap())
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("notifications.db")
}

fn spawn_store(source: Arc<SqliteEventSource>) -> NotificationStore {
    NotificationStore::spawn(
        source,
        Arc::new(StaticIdentity::signed_in(TEST_USER)),
        &EngineSettings::default(),
    )
}

async fn wait_for(
    store: &NotificationStore,
    predicate: impl FnMut(&NotificationsSnapshot) -> bool,
) -> NotificationsSnapshot {
    let mut updates = store.subscribe();
    let result = tokio::time::timeout(
        Duration::from_secs(WAIT_TIMEOUT_SECS),
        updates.wait_for(predicate),
    )
    .await
    .expect("timed out waiting for snapshot");
    let snapshot = result.expect("store stopped while waiting");
    snapshot.clone()
}

fn seed(source: &SqliteEventSource, count: usize) -> Vec<String> {
    distinct_unread(TEST_USER, count)
        .iter()
        .map(|r| source.upsert(r).unwrap())
        .collect()
}

#[tokio::test]
async fn test_listener_receives_local_writes() {
    let temp_dir = TempDir::new().unwrap();
    let source = open_source(&temp_dir);
    seed(&source, 2);
    let store = spawn_store(source.clone());

    store.start().await.unwrap();
    wait_for(&store, |s| {
        s.listener_state == ListenerState::Listening && s.notifications.len() == 2
    })
    .await;

    source
        .upsert(&record(TEST_USER, NotificationType::Reply, OTHER_USER, 9_000))
        .unwrap();

    let snapshot = wait_for(&store, |s| s.notifications.len() == 3).await;
    assert_eq!(snapshot.notifications[0].created_at, 9_000);
    assert_eq!(snapshot.unread_count, 3);
    store.shutdown().await;
}

#[tokio::test]
async fn test_listener_receives_external_writes() {
    let temp_dir = TempDir::new().unwrap();
    let source = open_source(&temp_dir);
    let store = spawn_store(source);
    store.start().await.unwrap();
    wait_for(&store, |s| s.listener_state == ListenerState::Listening).await;

    // A second connection to the same file, as another process would write.
    let external = open_source(&temp_dir);
    external
        .upsert(&record(TEST_USER, NotificationType::Follow, OTHER_USER, 100))
        .unwrap();

    let snapshot = wait_for(&store, |s| s.notifications.len() == 1).await;
    assert_eq!(snapshot.notifications[0].actor_id.as_deref(), Some(OTHER_USER));
    store.shutdown().await;
}

#[tokio::test]
async fn test_mark_all_read_persists() {
    let temp_dir = TempDir::new().unwrap();
    let source = open_source(&temp_dir);
    seed(&source, 12);
    let store = spawn_store(source);

    store.refresh().await.unwrap();
    assert_eq!(store.mark_all_read().await.unwrap(), 12);
    store.shutdown().await;

    let reopened = SqliteEventSource::open(&db_path(&temp_dir), POLL_INTERVAL).unwrap();
    let records = reopened.query_recent(TEST_USER, 100).await.unwrap();
    assert_eq!(records.len(), 12);
    assert!(records.iter().all(|r| r.read));
}

#[tokio::test]
async fn test_delete_all_read_persists() {
    let temp_dir = TempDir::new().unwrap();
    let source = open_source(&temp_dir);
    let ids = seed(&source, 4);
    let store = spawn_store(source.clone());

    store.refresh().await.unwrap();
    store.mark_read(ids[0].as_str()).await.unwrap();
    store.mark_read(ids[1].as_str()).await.unwrap();
    assert_eq!(store.delete_all_read().await.unwrap(), 2);

    assert!(source.get(&ids[0]).unwrap().is_none());
    assert!(source.get(&ids[1]).unwrap().is_none());
    assert!(source.get(&ids[2]).unwrap().is_some());
    assert_eq!(store.snapshot().notifications.len(), 2);
    store.shutdown().await;
}

#[tokio::test]
async fn test_fanout_over_ceiling_into_database() {
    let temp_dir = TempDir::new().unwrap();
    let source = open_source(&temp_dir);
    let store = spawn_store(source.clone());
    let targets: Vec<String> = (0..1_050).map(|i| format!("target-{i}")).collect();

    let mut payload = FanoutPayload::new(NotificationType::Mention);
    payload.body = Some("hello".to_string());
    let report = store
        .send_fanout_notifications(targets, payload)
        .await
        .unwrap();

    assert_eq!(report.delivered, 1_050);
    let delivered = source.query_recent("target-1049", 10).await.unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].actor_id.as_deref(), Some(TEST_USER));
    assert_eq!(delivered[0].body.as_deref(), Some("hello"));
    store.shutdown().await;
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = db_path(&temp_dir);
    {
        let source = SqliteEventSource::open(&path, POLL_INTERVAL).unwrap();
        seed(&source, 3);
    }

    let source = open_source(&temp_dir);
    let store = spawn_store(source);
    store.refresh().await.unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.notifications.len(), 3);
    assert_eq!(snapshot.unread_count, 3);
    store.shutdown().await;
}
