//! Assembles a [`WatcherNode`] from a change source and configuration.
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = WatcherBuilder::new(store_log, shutdown_rx)
//!     .with_config(StatewatchConfig::new()?)
//!     .build()?;
//! let watcher = node.watcher();
//! tokio::spawn(node.run());
//! ```
//!
//! ## Notes
//! - The source is taken by value and shared with the reader thread through an `Arc`.
//! - Dropping or signalling the `watch::Sender` stops the core and the reader thread.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::reconciler_for;
use super::ReaderWorker;
use super::Reconciler;
use super::Watcher;
use super::WatcherCore;
use crate::changelog::ChangeSource;
use crate::changelog::LogReader;
use crate::Result;
use crate::StatewatchConfig;

pub struct WatcherBuilder<S: ChangeSource> {
    source: Arc<S>,
    shutdown_signal: watch::Receiver<()>,
    config: StatewatchConfig,
    reconciler: Option<Box<dyn Reconciler>>,
}

impl<S: ChangeSource> WatcherBuilder<S> {
    /// Starts from default configuration.
    pub fn new(
        source: S,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            source: Arc::new(source),
            shutdown_signal,
            config: StatewatchConfig::default(),
            reconciler: None,
        }
    }

    pub fn with_config(
        mut self,
        config: StatewatchConfig,
    ) -> Self {
        self.config = config;
        self
    }

    /// Overrides the strategy selected by `watcher.reconcile`.
    pub fn with_reconciler(
        mut self,
        reconciler: impl Reconciler,
    ) -> Self {
        self.reconciler = Some(Box::new(reconciler));
        self
    }

    /// Validates the configuration and wires the core to its reader.
    /// Nothing runs until [`WatcherNode::run`].
    pub fn build(self) -> Result<WatcherNode<S>> {
        let config = self.config.validate()?;
        let watcher_config = config.watcher;

        let reconciler = self
            .reconciler
            .unwrap_or_else(|| reconciler_for(watcher_config.reconcile));

        let (command_tx, command_rx) = mpsc::channel(watcher_config.command_buffer_size);
        let (event_tx, event_rx) = mpsc::channel(watcher_config.reader_buffer_size);
        let (poll_tx, poll_rx) = crossbeam_channel::bounded(1);
        let (reader_shutdown_tx, reader_shutdown_rx) = crossbeam_channel::bounded(1);

        let reader = ReaderWorker::new(
            LogReader::new(self.source, None, watcher_config.max_batch_size),
            poll_rx,
            reader_shutdown_rx,
            event_tx,
            config.retry.log_reader,
            watcher_config.prime_from_snapshot,
        );

        debug!(
            strategy = reconciler.name(),
            prime = watcher_config.prime_from_snapshot,
            "watcher node built"
        );

        let core = WatcherCore::new(
            watcher_config,
            reconciler,
            command_rx,
            event_rx,
            poll_tx,
            reader_shutdown_tx,
            self.shutdown_signal,
        );

        Ok(WatcherNode {
            watcher: Watcher::new(command_tx),
            core,
            reader,
        })
    }
}

/// A built but not yet running watcher.
pub struct WatcherNode<S: ChangeSource> {
    watcher: Watcher,
    core: WatcherCore,
    reader: ReaderWorker<S>,
}

impl<S: ChangeSource> WatcherNode<S> {
    /// Client handle; stays usable for as long as [`WatcherNode::run`] runs.
    pub fn watcher(&self) -> Watcher {
        self.watcher.clone()
    }

    /// Starts the reader thread and drives the core loop until shutdown.
    ///
    /// Returns `Error::Fatal` when the change log failed unrecoverably; every
    /// subscription has been closed by then.
    pub async fn run(self) -> Result<()> {
        let WatcherNode { watcher, core, reader } = self;
        drop(watcher);

        let reader_thread = reader.spawn()?;
        info!("watcher node running");

        let result = core.run().await;

        match tokio::task::spawn_blocking(move || reader_thread.join()).await {
            Ok(Ok(())) => debug!("log reader thread joined"),
            Ok(Err(_)) => error!("log reader thread panicked"),
            Err(e) => error!("failed to join log reader thread: {}", e),
        }

        if result.is_ok() {
            info!("watcher node stopped");
        }
        result
    }
}
