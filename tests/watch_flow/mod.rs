use std::time::Duration;

use statewatch::ChangeRecord;
use statewatch::CloseReason;
use statewatch::MemChangeLog;
use statewatch::SourceError;
use statewatch::WatchKey;

use crate::common::ids;
use crate::common::next_within;
use crate::common::start;
use crate::common::start_manual;
use crate::common::test_config;

#[tokio::test]
async fn entity_watch_end_to_end() {
    let t = start_manual(MemChangeLog::new());
    let sub = t.watcher.watch_entity("machines", "0").await.unwrap();

    t.log.upsert("machines", "0");
    t.watcher.sync().await.unwrap();
    assert_eq!(sub.changes(), ids(&["0"]));
    assert!(sub.changes().is_empty());

    t.log.upsert("machines", "0");
    t.watcher.sync().await.unwrap();
    assert_eq!(sub.changes(), ids(&["0"]));
}

#[tokio::test]
async fn collection_watch_coalesces_a_burst() {
    let t = start_manual(MemChangeLog::new());
    let sub = t.watcher.watch_collection("machines").await.unwrap();

    for _ in 0..50 {
        t.log.upsert("machines", "0");
        t.log.upsert("machines", "1");
    }
    t.log.upsert("units", "a");
    t.watcher.sync().await.unwrap();

    assert_eq!(sub.changes(), ids(&["0", "1"]));
}

#[tokio::test]
async fn idle_polling_delivers_without_sync() {
    let t = start(MemChangeLog::new(), test_config(20));
    let sub = t.watcher.watch_entity("machines", "3").await.unwrap();

    t.log.upsert("machines", "3");

    assert_eq!(next_within(&sub).await, Some(ids(&["3"])));
}

#[tokio::test]
async fn late_watch_sees_known_documents() {
    let t = start_manual(MemChangeLog::new());
    t.log.upsert("machines", "0");
    t.log.upsert("machines", "1");
    t.log.remove("machines", "1");
    t.watcher.sync().await.unwrap();

    let sub = t.watcher.watch_collection("machines").await.unwrap();
    assert_eq!(sub.changes(), ids(&["0"]));

    let since = t.watcher.watch_since(WatchKey::collection("machines"), 1).await.unwrap();
    assert_eq!(since.changes(), ids(&["1"]));
}

#[tokio::test]
async fn replayed_record_is_not_redelivered() {
    let t = start_manual(MemChangeLog::new());
    let sub = t.watcher.watch_entity("machines", "0").await.unwrap();
    t.log.upsert("machines", "0");
    t.watcher.sync().await.unwrap();
    sub.changes();

    t.log.append(ChangeRecord::new("machines", "0", 1));
    t.watcher.sync().await.unwrap();

    assert!(sub.changes().is_empty());
}

#[tokio::test]
async fn removal_is_delivered_as_a_change() {
    let t = start_manual(MemChangeLog::new());
    t.log.upsert("units", "a");
    let sub = t.watcher.watch_entity("units", "a").await.unwrap();
    t.watcher.sync().await.unwrap();
    sub.changes();

    t.log.remove("units", "a");
    t.watcher.sync().await.unwrap();

    assert_eq!(sub.changes(), ids(&["a"]));
}

#[tokio::test]
async fn stopped_subscriptions_leave_the_registry() {
    let t = start_manual(MemChangeLog::new());
    let kept = t.watcher.watch_entity("machines", "0").await.unwrap();
    let stopped = t.watcher.watch_entity("machines", "0").await.unwrap();
    let dropped = t.watcher.watch_collection("machines").await.unwrap();

    stopped.stop();
    stopped.stop();
    drop(dropped);
    t.log.upsert("machines", "0");
    t.watcher.sync().await.unwrap();

    let stats = t.watcher.stats().await.unwrap();
    assert_eq!(stats.subscriptions, 1);
    assert_eq!(stats.watched_keys, 1);
    assert_eq!(kept.changes(), ids(&["0"]));
    assert!(stopped.changes().is_empty());
}

#[tokio::test]
async fn transient_faults_only_add_latency() {
    let t = start_manual(MemChangeLog::new());
    let sub = t.watcher.watch_entity("machines", "0").await.unwrap();

    t.log.fail_next_read(SourceError::Transient("connection reset".into()));
    t.log.fail_next_open(SourceError::Transient("no primary".into()));
    t.log.upsert("machines", "0");
    t.log.invalidate_cursors();
    t.watcher.sync().await.unwrap();

    assert_eq!(sub.changes(), ids(&["0"]));
}

#[tokio::test]
async fn aborted_cycle_is_retried_on_the_next_tick() {
    let mut config = test_config(20);
    config.retry.log_reader.max_retries = 1;
    let t = start(MemChangeLog::new(), config);
    let sub = t.watcher.watch_entity("machines", "0").await.unwrap();
    t.watcher.sync().await.unwrap();

    for _ in 0..3 {
        t.log.fail_next_read(SourceError::Transient("timeout".into()));
    }
    t.log.upsert("machines", "0");

    tokio::time::timeout(Duration::from_secs(2), t.watcher.sync())
        .await
        .expect("sync should resolve once a cycle succeeds")
        .unwrap();
    assert_eq!(sub.changes(), ids(&["0"]));
}

#[tokio::test]
async fn priming_seeds_known_state_from_snapshot() {
    let log = MemChangeLog::with_snapshots();
    log.upsert("machines", "0");
    log.upsert("machines", "0");
    log.upsert("machines", "1");

    let t = start_manual(log);
    t.watcher.sync().await.unwrap();

    let sub = t.watcher.watch_since(WatchKey::collection("machines"), 1).await.unwrap();
    assert_eq!(sub.changes(), ids(&["0"]));
    assert_eq!(t.watcher.stats().await.unwrap().known_documents, 2);
}

#[tokio::test]
async fn shutdown_closes_subscriptions() {
    let t = start_manual(MemChangeLog::new());
    let sub = t.watcher.watch_collection("machines").await.unwrap();

    t.shutdown_tx.send(()).unwrap();

    assert!(t.node.await.unwrap().is_ok());
    assert_eq!(next_within(&sub).await, None);
    assert_eq!(sub.close_reason(), Some(CloseReason::Shutdown));
    assert!(t.watcher.sync().await.is_err());
}
