use std::ops::ControlFlow;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use crossbeam_channel::RecvTimeoutError;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::PollRequest;
use super::ReaderEvent;
use crate::changelog::ChangeSource;
use crate::changelog::LogReader;
use crate::changelog::ReadError;
use crate::constants::READER_THREAD_NAME;
use crate::metrics::READER_RETRIES;
use crate::BackoffPolicy;
use crate::WatcherError;

/// Owns the [`LogReader`] on a dedicated thread so blocking store I/O never
/// stalls the core loop.
///
/// The thread idles until the core sends a [`PollRequest`], then reads until
/// the log head is reached, handing every batch to the core before committing
/// its resume token.
pub(crate) struct ReaderWorker<S: ChangeSource> {
    reader: LogReader<S>,
    poll_rx: Receiver<PollRequest>,
    shutdown_rx: Receiver<()>,
    event_tx: mpsc::Sender<ReaderEvent>,
    policy: BackoffPolicy,
    prime: bool,
    needs_fresh_start: bool,
}

impl<S: ChangeSource> ReaderWorker<S> {
    pub(crate) fn new(
        reader: LogReader<S>,
        poll_rx: Receiver<PollRequest>,
        shutdown_rx: Receiver<()>,
        event_tx: mpsc::Sender<ReaderEvent>,
        policy: BackoffPolicy,
        prime: bool,
    ) -> Self {
        Self {
            reader,
            poll_rx,
            shutdown_rx,
            event_tx,
            policy,
            prime,
            needs_fresh_start: false,
        }
    }

    /// Spawns the reader thread.
    pub(crate) fn spawn(self) -> crate::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || self.run())
            .map_err(|e| WatcherError::ReaderUnavailable(e.to_string()).into())
    }

    pub(crate) fn run(mut self) {
        debug!("log reader thread started");

        if self.prime && self.prime_known_state().is_break() {
            debug!("log reader thread stopped during priming");
            return;
        }

        loop {
            crossbeam_channel::select! {
                recv(self.poll_rx) -> request => {
                    match request {
                        Ok(request) => {
                            if self.run_cycle(request.seq).is_break() {
                                break;
                            }
                        }
                        Err(_) => {
                            debug!("poll channel closed");
                            break;
                        }
                    }
                }
                recv(self.shutdown_rx) -> _ => {
                    debug!("log reader received shutdown signal");
                    break;
                }
            }
        }

        debug!("log reader thread stopped");
    }

    fn prime_known_state(&mut self) -> ControlFlow<()> {
        let mut attempts = 0;
        loop {
            match self.reader.prime() {
                Ok(Some(snapshot)) => {
                    info!(
                        documents = snapshot.records.len(),
                        resume = ?snapshot.token,
                        "known state primed from snapshot"
                    );
                    return self.send(ReaderEvent::Primed(snapshot.records));
                }
                Ok(None) => {
                    debug!("source cannot snapshot, tailing from oldest retained entry");
                    return ControlFlow::Continue(());
                }
                Err(ReadError::Fatal(reason)) => return self.fatal(reason),
                Err(e) => {
                    if !self.policy.allows_retry(attempts) {
                        warn!("priming abandoned after {} attempts: {}", attempts, e);
                        return ControlFlow::Continue(());
                    }
                    if self.backoff(&mut attempts, &e).is_break() {
                        return ControlFlow::Break(());
                    }
                }
            }
        }
    }

    /// Reads until the log head is reached.
    pub(crate) fn run_cycle(
        &mut self,
        seq: u64,
    ) -> ControlFlow<()> {
        trace!(seq, "poll cycle started");
        let mut attempts = 0;

        loop {
            if self.needs_fresh_start {
                match self.reader.reopen_fresh() {
                    Ok(snapshot) => {
                        self.needs_fresh_start = false;
                        attempts = 0;
                        if self.send(ReaderEvent::Discontinuity { snapshot }).is_break() {
                            return ControlFlow::Break(());
                        }
                    }
                    Err(ReadError::Fatal(reason)) => return self.fatal(reason),
                    Err(e) => {
                        if !self.policy.allows_retry(attempts) {
                            return self.abort(seq, e);
                        }
                        if self.backoff(&mut attempts, &e).is_break() {
                            return ControlFlow::Break(());
                        }
                    }
                }
                continue;
            }

            match self.reader.next() {
                Ok(batch) if batch.is_empty() => {
                    trace!(seq, "poll cycle reached log head");
                    return self.send(ReaderEvent::CycleComplete { seq });
                }
                Ok(batch) => {
                    let token = batch.token;
                    trace!(seq, records = batch.records.len(), "handing batch to core");
                    if self.send(ReaderEvent::Batch(batch.records)).is_break() {
                        return ControlFlow::Break(());
                    }
                    if let Some(token) = token {
                        self.reader.commit(token);
                    }
                    attempts = 0;
                }
                Err(ReadError::ResumeRejected(token)) => {
                    warn!(resume = %token, "resume token rejected, restarting log reader fresh");
                    self.needs_fresh_start = true;
                }
                Err(ReadError::Fatal(reason)) => return self.fatal(reason),
                Err(e @ ReadError::Retryable(_)) => {
                    if !self.policy.allows_retry(attempts) {
                        return self.abort(seq, e);
                    }
                    if self.backoff(&mut attempts, &e).is_break() {
                        return ControlFlow::Break(());
                    }
                }
            }
        }
    }

    /// Sleeps before the next attempt; breaks if shutdown arrives meanwhile.
    fn backoff(
        &self,
        attempts: &mut usize,
        error: &ReadError,
    ) -> ControlFlow<()> {
        READER_RETRIES.inc();
        let delay = jittered(self.policy.delay_for(*attempts));
        *attempts += 1;
        debug!(attempt = *attempts, ?delay, "retrying change log read: {}", error);

        match self.shutdown_rx.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => ControlFlow::Continue(()),
            _ => ControlFlow::Break(()),
        }
    }

    fn abort(
        &mut self,
        seq: u64,
        error: ReadError,
    ) -> ControlFlow<()> {
        warn!(seq, "poll cycle aborted after exhausting retries: {}", error);
        self.reader.reset_cursor();
        self.send(ReaderEvent::CycleAborted {
            seq,
            reason: error.to_string(),
        })
    }

    fn fatal(
        &self,
        reason: String,
    ) -> ControlFlow<()> {
        error!("change log failed unrecoverably: {}", reason);
        // Breaks either way
        let _ = self.send(ReaderEvent::Fatal(reason));
        ControlFlow::Break(())
    }

    fn send(
        &self,
        event: ReaderEvent,
    ) -> ControlFlow<()> {
        match self.event_tx.blocking_send(event) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => {
                debug!("watcher core gone, stopping log reader");
                ControlFlow::Break(())
            }
        }
    }
}

/// Adds up to 25% random jitter so many readers do not retry in lockstep.
fn jittered(delay: Duration) -> Duration {
    let millis = delay.as_millis() as u64;
    if millis < 4 {
        return delay;
    }
    let extra = rand::thread_rng().gen_range(0..=millis / 4);
    delay + Duration::from_millis(extra)
}
