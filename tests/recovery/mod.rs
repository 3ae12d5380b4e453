use statewatch::CloseReason;
use statewatch::Error;
use statewatch::MemChangeLog;
use statewatch::ReconcileMode;
use statewatch::SourceError;

use crate::common::ids;
use crate::common::next_within;
use crate::common::start;
use crate::common::start_manual;
use crate::common::test_config;

#[tokio::test]
async fn truncated_gap_is_reconciled_from_snapshot() {
    let t = start_manual(MemChangeLog::with_snapshots());
    t.log.upsert("machines", "0");
    t.log.upsert("machines", "1");
    t.log.upsert("machines", "2");
    t.watcher.sync().await.unwrap();

    let machines = t.watcher.watch_collection("machines").await.unwrap();
    let one = t.watcher.watch_entity("machines", "1").await.unwrap();
    machines.changes();
    one.changes();

    // The watcher falls behind a truncation
    t.log.upsert("machines", "0");
    t.log.remove("machines", "2");
    t.log.upsert("machines", "3");
    t.log.truncate_through(t.log.head().unwrap());
    t.watcher.sync().await.unwrap();

    assert_eq!(machines.changes(), ids(&["0", "2", "3"]));
    assert!(one.changes().is_empty());

    // Tailing continues normally afterwards
    t.log.upsert("machines", "1");
    t.watcher.sync().await.unwrap();
    assert_eq!(one.changes(), ids(&["1"]));
}

#[tokio::test]
async fn truncation_after_syncing_an_empty_log_is_reconciled() {
    let t = start_manual(MemChangeLog::with_snapshots());
    t.watcher.sync().await.unwrap();

    let machines = t.watcher.watch_collection("machines").await.unwrap();
    let zero = t.watcher.watch_entity("machines", "0").await.unwrap();
    assert!(machines.changes().is_empty());

    t.log.upsert("machines", "0");
    t.log.upsert("machines", "1");
    t.log.truncate_through(t.log.head().unwrap());
    t.log.upsert("machines", "2");
    t.watcher.sync().await.unwrap();

    assert_eq!(machines.changes(), ids(&["0", "1", "2"]));
    assert_eq!(zero.changes(), ids(&["0"]));
}

#[tokio::test]
async fn truncation_after_syncing_an_empty_log_without_snapshot_reaches_entity_watches() {
    let t = start_manual(MemChangeLog::new());
    t.watcher.sync().await.unwrap();

    let zero = t.watcher.watch_entity("machines", "0").await.unwrap();
    let two = t.watcher.watch_entity("machines", "2").await.unwrap();

    t.log.upsert("machines", "0");
    t.log.upsert("machines", "1");
    t.log.truncate_through(t.log.head().unwrap());
    t.log.upsert("machines", "2");
    t.watcher.sync().await.unwrap();

    assert_eq!(zero.changes(), ids(&["0"]));
    assert_eq!(two.changes(), ids(&["2"]));
}

#[tokio::test]
async fn truncated_gap_without_snapshot_assumes_everything_changed() {
    let t = start_manual(MemChangeLog::new());
    t.log.upsert("machines", "0");
    t.watcher.sync().await.unwrap();

    let known = t.watcher.watch_entity("machines", "0").await.unwrap();
    let unseen = t.watcher.watch_entity("machines", "5").await.unwrap();
    known.changes();

    t.log.upsert("machines", "5");
    t.log.upsert("machines", "6");
    t.log.truncate_through(t.log.head().unwrap());
    t.watcher.sync().await.unwrap();

    assert_eq!(known.changes(), ids(&["0"]));
    assert_eq!(unseen.changes(), ids(&["5"]));
}

#[tokio::test]
async fn assume_changed_mode_is_selected_by_config() {
    let mut config = test_config(crate::common::MANUAL_POLLING_MS);
    config.watcher.reconcile = ReconcileMode::AssumeChanged;
    let t = start(MemChangeLog::with_snapshots(), config);
    t.log.upsert("machines", "0");
    t.log.upsert("machines", "1");
    t.watcher.sync().await.unwrap();

    let machines = t.watcher.watch_collection("machines").await.unwrap();
    machines.changes();

    t.log.upsert("units", "a");
    t.log.truncate_through(t.log.head().unwrap());
    t.watcher.sync().await.unwrap();

    // Nothing in machines moved, but the blanket strategy reports it anyway
    assert_eq!(machines.changes(), ids(&["0", "1"]));
}

#[tokio::test]
async fn fatal_store_error_closes_everything() {
    let t = start_manual(MemChangeLog::new());
    let sub = t.watcher.watch_entity("machines", "0").await.unwrap();
    t.watcher.sync().await.unwrap();

    t.log.fail_next_read(SourceError::Fatal("store closed".into()));
    assert!(t.watcher.sync().await.is_err());

    let result = t.node.await.unwrap();
    assert!(matches!(result, Err(Error::Fatal(reason)) if reason == "store closed"));
    assert_eq!(next_within(&sub).await, None);
    assert_eq!(sub.close_reason(), Some(CloseReason::Fatal));
    assert!(t.watcher.is_closed());
}
