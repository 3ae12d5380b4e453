//! State change watcher
//!
//! Tails the committed change log and fans out filtered, coalesced
//! notifications to any number of subscriptions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐ PollRequest  ┌──────────────────┐
//! │ WatcherCore  │─────────────▶│  ReaderWorker    │ (dedicated thread,
//! │  (tokio task)│◀─────────────│  LogReader<S>    │  blocking source I/O)
//! └──────┬───────┘ ReaderEvent  └──────────────────┘
//!        │ KnownState revno diff, Registry lookup
//!        ▼
//! ┌──────────────┐
//! │  Mailbox     │ pending id set + single-permit signal, per subscription
//! └──────┬───────┘
//!        ▼
//!   Subscription::next() / changes() in the consumer
//! ```
//!
//! The core task is the only owner of the registry and known state. Callers
//! reach it through [`Watcher`] (watch / sync / stats) and subscriptions reach
//! it through an unwatch queue when stopped or dropped.
//!
//! Delivery is at-least-once: duplicates in the log are filtered by revno,
//! bursts collapse into one pending id, and after a log discontinuity the
//! configured [`Reconciler`] prefers spurious wake-ups over missed changes.
//!
//! # Usage Example
//!
//! ```ignore
//! let log = MemChangeLog::with_snapshots();
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
//! let node = WatcherBuilder::new(log.clone(), shutdown_rx).build()?;
//! let watcher = node.watcher();
//! tokio::spawn(node.run());
//!
//! let sub = watcher.watch_entity("machines", "0").await?;
//! log.upsert("machines", "0");
//! watcher.sync().await?;
//! assert_eq!(sub.changes().len(), 1);
//! ```

mod builder;
mod command;
mod watcher_core;
mod handle;
mod known_state;
mod reader_worker;
mod reconcile;
mod registry;
mod subscription;
mod sync;

pub use builder::*;
pub use handle::*;
pub use known_state::*;
pub use reconcile::*;
pub use subscription::*;

pub(crate) use command::*;
pub(crate) use watcher_core::*;
pub(crate) use reader_worker::*;
pub(crate) use registry::*;
pub(crate) use sync::*;

#[cfg(test)]
mod known_state_test;
#[cfg(test)]
mod registry_test;
#[cfg(test)]
mod sync_test;
