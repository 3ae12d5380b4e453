use std::time::Duration;

use statewatch::ChangeSet;
use statewatch::MemChangeLog;
use statewatch::Result;
use statewatch::StatewatchConfig;
use statewatch::Subscription;
use statewatch::Watcher;
use statewatch::WatcherBuilder;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Long enough that only `sync()` drives polling
pub const MANUAL_POLLING_MS: u64 = 3_600_000;

pub struct TestWatcher {
    pub log: MemChangeLog,
    pub watcher: Watcher,
    pub shutdown_tx: watch::Sender<()>,
    pub node: JoinHandle<Result<()>>,
}

pub fn test_config(poll_interval_ms: u64) -> StatewatchConfig {
    let mut config = StatewatchConfig::default();
    config.watcher.poll_interval_ms = poll_interval_ms;
    config.retry.log_reader.base_delay_ms = 1;
    config.retry.log_reader.max_delay_ms = 5;
    config
}

pub fn start(
    log: MemChangeLog,
    config: StatewatchConfig,
) -> TestWatcher {
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let node = WatcherBuilder::new(log.clone(), shutdown_rx)
        .with_config(config)
        .build()
        .expect("watcher should build");
    let watcher = node.watcher();
    TestWatcher {
        log,
        watcher,
        shutdown_tx,
        node: tokio::spawn(node.run()),
    }
}

pub fn start_manual(log: MemChangeLog) -> TestWatcher {
    start(log, test_config(MANUAL_POLLING_MS))
}

pub fn ids(list: &[&str]) -> ChangeSet {
    list.iter().map(|id| id.to_string()).collect()
}

/// Waits for the next delivery, failing the test after two seconds.
pub async fn next_within(sub: &Subscription) -> Option<ChangeSet> {
    tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("no delivery within timeout")
}
