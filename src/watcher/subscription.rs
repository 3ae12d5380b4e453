use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::stream;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::trace;

use crate::changelog::DocumentKey;
use crate::WatcherError;

/// Ids with undelivered changes, as returned by one drain
pub type ChangeSet = BTreeSet<DocumentKey>;

/// What a subscription is interested in
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WatchKey {
    /// Any document of the collection
    Collection(String),
    /// One document: (collection, id)
    Entity(String, DocumentKey),
}

impl WatchKey {
    pub fn collection(name: impl Into<String>) -> Self {
        WatchKey::Collection(name.into())
    }

    pub fn entity(
        collection: impl Into<String>,
        id: impl Into<DocumentKey>,
    ) -> Self {
        WatchKey::Entity(collection.into(), id.into())
    }

    pub fn collection_name(&self) -> &str {
        match self {
            WatchKey::Collection(collection) | WatchKey::Entity(collection, _) => collection,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), WatcherError> {
        match self {
            WatchKey::Collection(collection) if collection.is_empty() => {
                Err(WatcherError::InvalidWatchKey("empty collection name".into()))
            }
            WatchKey::Entity(collection, _) if collection.is_empty() => {
                Err(WatcherError::InvalidWatchKey("empty collection name".into()))
            }
            WatchKey::Entity(collection, id) if id.is_empty() => Err(WatcherError::InvalidWatchKey(format!(
                "empty document id in collection {collection}"
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for WatchKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            WatchKey::Collection(collection) => write!(f, "{collection}/*"),
            WatchKey::Entity(collection, id) => write!(f, "{collection}/{id}"),
        }
    }
}

/// Unique identifier of a subscription within one watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Why a subscription stopped delivering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The consumer called `stop()` or dropped the handle
    Stopped,
    /// The watcher was shut down
    Shutdown,
    /// The change log failed unrecoverably; the watcher is unavailable
    Fatal,
}

#[derive(Debug, Default)]
struct MailboxState {
    pending: ChangeSet,
    closed: Option<CloseReason>,
}

/// Delivery path between the core and one subscription.
///
/// The pending set is the source of truth; the signal holds at most one
/// permit, so a slow consumer sees collapsed wake-ups but never loses an id.
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    state: Mutex<MailboxState>,
    signal: Notify,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds `id` to the pending set. Returns `true` when the id was not
    /// pending yet. Marks on a closed mailbox are ignored.
    pub(crate) fn mark(
        &self,
        id: &str,
    ) -> bool {
        let was_empty;
        {
            let mut state = self.state.lock();
            if state.closed.is_some() || state.pending.contains(id) {
                return false;
            }
            was_empty = state.pending.is_empty();
            state.pending.insert(id.to_string());
        }
        if was_empty {
            self.signal.notify_one();
        }
        true
    }

    /// Marks several ids; returns how many were newly pending.
    pub(crate) fn mark_all<I>(
        &self,
        ids: I,
    ) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        ids.into_iter().filter(|id| self.mark(id.as_ref())).count()
    }

    pub(crate) fn drain(&self) -> ChangeSet {
        std::mem::take(&mut self.state.lock().pending)
    }

    /// Closes the mailbox; the first reason wins. A stopped mailbox drops
    /// its pending ids, a mailbox closed by the watcher keeps them so the
    /// consumer can drain what was already observed.
    pub(crate) fn close(
        &self,
        reason: CloseReason,
    ) {
        {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return;
            }
            state.closed = Some(reason);
            if reason == CloseReason::Stopped {
                state.pending.clear();
            }
        }
        self.signal.notify_one();
    }

    pub(crate) fn close_reason(&self) -> Option<CloseReason> {
        self.state.lock().closed
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    async fn next(&self) -> Option<ChangeSet> {
        loop {
            let notified = self.signal.notified();
            {
                let mut state = self.state.lock();
                if !state.pending.is_empty() {
                    return Some(std::mem::take(&mut state.pending));
                }
                if state.closed.is_some() {
                    return None;
                }
            }
            notified.await;
        }
    }
}

/// Caller-held interest in a [`WatchKey`].
///
/// The handle never carries document contents: each delivery is the set of
/// ids that changed since the previous drain, and the consumer re-reads
/// authoritative state for them. Dropping the handle stops it.
pub struct Subscription {
    id: SubscriptionId,
    key: WatchKey,
    mailbox: Arc<Mailbox>,
    unwatch_tx: mpsc::UnboundedSender<SubscriptionId>,
    stopped: AtomicBool,
}

impl fmt::Debug for Subscription {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("pending", &self.mailbox.pending_len())
            .field("closed", &self.mailbox.close_reason())
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        key: WatchKey,
        mailbox: Arc<Mailbox>,
        unwatch_tx: mpsc::UnboundedSender<SubscriptionId>,
    ) -> Self {
        Self {
            id,
            key,
            mailbox,
            unwatch_tx,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn key(&self) -> &WatchKey {
        &self.key
    }

    /// Returns the current pending set and clears it; empty when nothing
    /// changed since the last drain.
    pub fn changes(&self) -> ChangeSet {
        self.mailbox.drain()
    }

    /// Waits for a non-empty pending set and drains it.
    ///
    /// Returns `None` once the subscription is closed and nothing is left
    /// to drain.
    pub async fn next(&self) -> Option<ChangeSet> {
        self.mailbox.next().await
    }

    /// Endless sequence of drained sets, ending when the subscription closes.
    pub fn into_stream(self) -> impl Stream<Item = ChangeSet> + Send {
        stream::unfold(self, |subscription| async move {
            let changes = subscription.next().await?;
            Some((changes, subscription))
        })
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.mailbox.close_reason()
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason().is_some()
    }

    /// Stops delivery and unregisters from the watcher. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.mailbox.close(CloseReason::Stopped);
        if self.unwatch_tx.send(self.id).is_err() {
            trace!(subscription_id = self.id.0, "watcher already gone, nothing to unregister");
        } else {
            trace!(subscription_id = self.id.0, key = %self.key, "subscription stopped");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}
