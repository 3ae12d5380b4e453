use std::sync::Arc;

use crossbeam_channel::TrySendError;
use prometheus::IntGauge;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::CloseReason;
use super::Command;
use super::KnownState;
use super::Mailbox;
use super::PollRequest;
use super::ReaderEvent;
use super::Reconciler;
use super::Registry;
use super::Subscription;
use super::SubscriptionId;
use super::SyncController;
use super::WatchKey;
use super::WatcherStats;
use crate::changelog::ChangeRecord;
use crate::changelog::Revno;
use crate::changelog::Snapshot;
use crate::metrics::ACTIVE_SUBSCRIPTIONS;
use crate::metrics::DUPLICATE_RECORDS;
use crate::metrics::PENDING_MARKS;
use crate::metrics::RECONCILIATIONS;
use crate::metrics::RECORDS_APPLIED;
use crate::Error;
use crate::Result;
use crate::WatcherConfig;

/// The single serialization point of the watcher.
///
/// Owns [`KnownState`] and the [`Registry`]; everything else talks to it
/// through channels. Reader events take priority over requests so that a
/// `watch` or `stats` issued after a batch was handed over sees its effect.
pub(crate) struct WatcherCore {
    config: WatcherConfig,
    known: KnownState,
    registry: Registry,
    reconciler: Box<dyn Reconciler>,
    sync: SyncController,
    next_subscription_id: u64,
    /// Shared by every core in the process, so only ever adjusted by deltas
    active_subscriptions: IntGauge,

    command_rx: mpsc::Receiver<Command>,
    unwatch_tx: mpsc::UnboundedSender<SubscriptionId>,
    unwatch_rx: mpsc::UnboundedReceiver<SubscriptionId>,
    reader_rx: mpsc::Receiver<ReaderEvent>,
    poll_tx: crossbeam_channel::Sender<PollRequest>,
    reader_shutdown_tx: crossbeam_channel::Sender<()>,
    shutdown_signal: watch::Receiver<()>,
}

impl WatcherCore {
    pub(crate) fn new(
        config: WatcherConfig,
        reconciler: Box<dyn Reconciler>,
        command_rx: mpsc::Receiver<Command>,
        reader_rx: mpsc::Receiver<ReaderEvent>,
        poll_tx: crossbeam_channel::Sender<PollRequest>,
        reader_shutdown_tx: crossbeam_channel::Sender<()>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        let (unwatch_tx, unwatch_rx) = mpsc::unbounded_channel();
        Self {
            config,
            known: KnownState::new(),
            registry: Registry::new(),
            reconciler,
            sync: SyncController::new(),
            next_subscription_id: 1,
            active_subscriptions: ACTIVE_SUBSCRIPTIONS.clone(),
            command_rx,
            unwatch_tx,
            unwatch_rx,
            reader_rx,
            poll_tx,
            reader_shutdown_tx,
            shutdown_signal,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_subscription_gauge(
        mut self,
        gauge: IntGauge,
    ) -> Self {
        self.active_subscriptions = gauge;
        self
    }

    pub(crate) async fn run(mut self) -> Result<()> {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            strategy = self.reconciler.name(),
            "watcher core started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_signal.changed() => {
                    warn!("watcher shutdown signal received");
                    self.shutdown(CloseReason::Shutdown);
                    return Ok(());
                }

                event = self.reader_rx.recv() => {
                    let Some(event) = event else {
                        error!("log reader exited unexpectedly");
                        self.shutdown(CloseReason::Fatal);
                        return Err(Error::Fatal("log reader exited unexpectedly".to_string()));
                    };
                    if let Err(e) = self.handle_reader_event(event) {
                        self.shutdown(CloseReason::Fatal);
                        return Err(e);
                    }
                }

                Some(id) = self.unwatch_rx.recv() => {
                    self.handle_unwatch(id);
                }

                command = self.command_rx.recv(), if commands_open => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            debug!("all watcher handles dropped, serving subscriptions only");
                            commands_open = false;
                        }
                    }
                }

                _ = ticker.tick() => {
                    let seq = self.sync.on_tick();
                    self.issue_poll(seq);
                }
            }
        }
    }

    pub(crate) fn handle_reader_event(
        &mut self,
        event: ReaderEvent,
    ) -> Result<()> {
        match event {
            ReaderEvent::Primed(records) => {
                debug!(documents = records.len(), "seeding known state");
                self.apply_records(records);
            }
            ReaderEvent::Batch(records) => self.apply_records(records),
            ReaderEvent::Discontinuity { snapshot } => self.reconcile(snapshot.as_ref()),
            ReaderEvent::CycleComplete { seq } => {
                trace!(seq, "poll cycle complete");
                let next = self.sync.on_cycle_complete(seq);
                self.issue_poll(next);
            }
            ReaderEvent::CycleAborted { seq, reason } => {
                warn!(seq, waiting = self.sync.waiting(), "poll cycle aborted: {}", reason);
                self.sync.on_cycle_aborted(seq);
            }
            ReaderEvent::Fatal(reason) => {
                error!("watcher stopping on unrecoverable change log error: {}", reason);
                return Err(Error::Fatal(reason));
            }
        }
        Ok(())
    }

    fn handle_command(
        &mut self,
        command: Command,
    ) {
        match command {
            Command::Watch { key, since, reply } => {
                let result = self.handle_watch(key, since);
                // A caller that gave up drops the subscription, which unwatches it
                let _ = reply.send(result);
            }
            Command::Sync { reply } => {
                let seq = self.sync.on_sync(reply);
                self.issue_poll(seq);
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    /// Discards replays, advances known state and marks every interested
    /// subscription.
    pub(crate) fn apply_records(
        &mut self,
        records: Vec<ChangeRecord>,
    ) {
        for record in records {
            if !self.known.observe(&record) {
                DUPLICATE_RECORDS.inc();
                trace!(
                    collection = %record.collection,
                    id = %record.id,
                    revno = record.revno,
                    "stale record discarded"
                );
                continue;
            }
            RECORDS_APPLIED.inc();

            let mut marked = 0;
            self.registry.for_each_matching(&record.collection, &record.id, |mailbox| {
                if mailbox.mark(&record.id) {
                    marked += 1;
                }
            });
            PENDING_MARKS.inc_by(marked);
        }
    }

    fn reconcile(
        &mut self,
        snapshot: Option<&Snapshot>,
    ) {
        let plan = self.reconciler.reconcile(&mut self.known, snapshot);
        RECONCILIATIONS.with_label_values(&[self.reconciler.name()]).inc();

        let mut marked = 0;
        for doc in &plan.suspects {
            self.registry.for_each_matching(&doc.collection, &doc.id, |mailbox| {
                if mailbox.mark(&doc.id) {
                    marked += 1;
                }
            });
        }
        if plan.all_watched_entities {
            self.registry.for_each_entity(|id, mailbox| {
                if mailbox.mark(id) {
                    marked += 1;
                }
            });
        }
        PENDING_MARKS.inc_by(marked);

        info!(
            strategy = self.reconciler.name(),
            suspects = plan.suspects.len(),
            marked,
            "reconciled after change log discontinuity"
        );
    }

    fn handle_watch(
        &mut self,
        key: WatchKey,
        since: Option<Revno>,
    ) -> Result<Subscription> {
        key.validate()?;

        let id = SubscriptionId(self.next_subscription_id);
        self.next_subscription_id += 1;

        let mailbox = Arc::new(Mailbox::new());
        let seeded = mailbox.mark_all(self.known.catch_up(&key, since));
        self.registry.insert(id, key.clone(), mailbox.clone());
        self.active_subscriptions.inc();

        debug!(subscription_id = id.0, key = %key, ?since, seeded, "subscription created");
        Ok(Subscription::new(id, key, mailbox, self.unwatch_tx.clone()))
    }

    fn handle_unwatch(
        &mut self,
        id: SubscriptionId,
    ) {
        if self.registry.remove(id) {
            self.active_subscriptions.dec();
        } else {
            trace!(subscription_id = id.0, "unwatch for unknown subscription ignored");
        }
    }

    fn issue_poll(
        &mut self,
        seq: Option<u64>,
    ) {
        let Some(seq) = seq else {
            return;
        };
        match self.poll_tx.try_send(PollRequest { seq }) {
            Ok(()) => trace!(seq, "poll requested"),
            Err(TrySendError::Full(_)) => {
                warn!(seq, "log reader still busy, poll dropped");
                self.sync.cancel(seq);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(seq, "log reader gone, poll dropped");
                self.sync.cancel(seq);
            }
        }
    }

    pub(crate) fn stats(&self) -> WatcherStats {
        WatcherStats {
            subscriptions: self.registry.len(),
            watched_keys: self.registry.watched_keys(),
            entity_collections: self.registry.entity_collections(),
            known_documents: self.known.len(),
            polls_issued: self.sync.polls_issued(),
            sync_waiters: self.sync.waiting(),
        }
    }

    fn shutdown(
        &mut self,
        reason: CloseReason,
    ) {
        let closed = self.registry.close_all(reason);
        self.active_subscriptions.sub(closed as i64);
        self.sync.fail_all();
        // Reader may already be gone
        let _ = self.reader_shutdown_tx.try_send(());
        info!(closed, ?reason, "watcher core stopped");
    }
}
