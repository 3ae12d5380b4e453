use tokio::sync::oneshot;
use tracing::trace;

#[derive(Debug)]
struct SyncWaiter {
    /// Completed by any cycle with `seq >= needs`
    needs: u64,
    reply: oneshot::Sender<()>,
}

/// Decides when the core asks the log reader for a poll cycle.
///
/// At most one cycle is outstanding. Idle ticks only poll when nothing is
/// in flight. A sync request must be answered by a cycle that *starts* after
/// the request, so when a cycle is already running the next one is issued as
/// soon as it completes.
#[derive(Debug, Default)]
pub(crate) struct SyncController {
    next_seq: u64,
    outstanding: Option<u64>,
    waiters: Vec<SyncWaiter>,
    issued: u64,
}

impl SyncController {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Idle tick; returns the seq of a poll to issue.
    pub(crate) fn on_tick(&mut self) -> Option<u64> {
        if self.outstanding.is_some() {
            return None;
        }
        Some(self.issue())
    }

    /// Registers a sync waiter; returns the seq of a poll to issue now.
    pub(crate) fn on_sync(
        &mut self,
        reply: oneshot::Sender<()>,
    ) -> Option<u64> {
        self.waiters.push(SyncWaiter {
            needs: self.next_seq,
            reply,
        });
        if self.outstanding.is_some() {
            trace!(outstanding = ?self.outstanding, "sync queued behind running poll");
            return None;
        }
        Some(self.issue())
    }

    /// A cycle drained the log; wakes satisfied waiters and returns the seq of
    /// a follow-up poll when later waiters remain.
    pub(crate) fn on_cycle_complete(
        &mut self,
        seq: u64,
    ) -> Option<u64> {
        if self.outstanding == Some(seq) {
            self.outstanding = None;
        }

        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|w| w.needs <= seq);
        self.waiters = waiting;
        for waiter in done {
            // Caller may have given up waiting
            let _ = waiter.reply.send(());
        }

        if !self.waiters.is_empty() && self.outstanding.is_none() {
            return Some(self.issue());
        }
        None
    }

    /// A cycle gave up after exhausting retries; waiters stay queued for the
    /// next successful cycle.
    pub(crate) fn on_cycle_aborted(
        &mut self,
        seq: u64,
    ) {
        if self.outstanding == Some(seq) {
            self.outstanding = None;
        }
    }

    /// Forgets a poll that could not be handed to the reader.
    pub(crate) fn cancel(
        &mut self,
        seq: u64,
    ) {
        if self.outstanding == Some(seq) {
            self.outstanding = None;
        }
    }

    /// Drops every waiter; their callers observe the watcher as stopped.
    pub(crate) fn fail_all(&mut self) {
        self.waiters.clear();
    }

    pub(crate) fn waiting(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn polls_issued(&self) -> u64 {
        self.issued
    }

    fn issue(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.outstanding = Some(seq);
        self.issued += 1;
        seq
    }
}
