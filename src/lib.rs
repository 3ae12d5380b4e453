//! # statewatch
//!
//! State change watcher for a cluster control plane.
//!
//! Workers register interest in a whole collection or a single document and
//! are told *which* ids changed; they re-read authoritative state themselves.
//! The watcher tails an ordered change log on a dedicated reader thread,
//! filters replays by revision number and coalesces bursts per subscriber.
//!
//! ## Modules
//! - [`changelog`]: change source abstraction, log reader and an in-memory log
//! - `watcher`: core loop, subscriptions, sync and reconciliation
//! - `config`: layered configuration
//! - `service`: OS service management capability
//!
//! ## Quick Start
//! ```ignore
//! let log = MemChangeLog::with_snapshots();
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
//! let node = WatcherBuilder::new(log.clone(), shutdown_rx).build()?;
//! let watcher = node.watcher();
//! tokio::spawn(node.run());
//!
//! let machine = watcher.watch_entity("machines", "0").await?;
//! while let Some(changed) = machine.next().await {
//!     // re-read machines/0
//! }
//! ```

pub mod changelog;
mod config;
mod constants;
mod errors;
pub mod metrics;
mod service;
mod watcher;

pub use changelog::ChangeRecord;
pub use changelog::ChangeSource;
pub use changelog::MemChangeLog;
pub use changelog::ResumeToken;
pub use config::*;
pub use errors::*;
pub use service::*;
pub use watcher::*;
