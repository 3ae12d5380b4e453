use tokio::sync::oneshot;

use super::Subscription;
use super::WatchKey;
use super::WatcherStats;
use crate::changelog::ChangeRecord;
use crate::changelog::Revno;
use crate::changelog::Snapshot;
use crate::Result;

/// Control requests from [`super::Watcher`] handles to the core loop
#[derive(Debug)]
pub(crate) enum Command {
    Watch {
        key: WatchKey,
        since: Option<Revno>,
        reply: oneshot::Sender<Result<Subscription>>,
    },
    Sync {
        reply: oneshot::Sender<()>,
    },
    Stats {
        reply: oneshot::Sender<WatcherStats>,
    },
}

/// Core -> reader: run one poll cycle (read until caught up)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PollRequest {
    pub seq: u64,
}

/// Reader -> core
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReaderEvent {
    /// Snapshot records seeding known state at start
    Primed(Vec<ChangeRecord>),
    /// Records in commit order
    Batch(Vec<ChangeRecord>),
    /// The resume token was rejected and the reader restarted fresh
    Discontinuity { snapshot: Option<Snapshot> },
    /// Poll cycle `seq` reached the head of the log
    CycleComplete { seq: u64 },
    /// Poll cycle `seq` gave up after exhausting retries
    CycleAborted { seq: u64, reason: String },
    /// The reader stopped on an unrecoverable error
    Fatal(String),
}
