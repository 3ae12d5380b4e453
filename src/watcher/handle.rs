use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::Command;
use super::Subscription;
use super::WatchKey;
use crate::changelog::DocumentKey;
use crate::changelog::Revno;
use crate::Result;
use crate::WatcherError;

/// Point-in-time counters of a running watcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub subscriptions: usize,
    pub watched_keys: usize,
    /// Collections holding at least one entity subscription
    pub entity_collections: usize,
    pub known_documents: usize,
    pub polls_issued: u64,
    pub sync_waiters: usize,
}

/// Cloneable client of a running watcher core.
///
/// Every call is a request/response round trip through the core loop, so a
/// watch issued after [`Watcher::sync`] returned always sees the synced state.
/// All calls fail with [`WatcherError::Stopped`] once the core is gone.
#[derive(Debug, Clone)]
pub struct Watcher {
    command_tx: mpsc::Sender<Command>,
}

impl Watcher {
    pub(crate) fn new(command_tx: mpsc::Sender<Command>) -> Self {
        Self { command_tx }
    }

    /// Registers interest in `key`.
    ///
    /// The returned subscription is seeded with the live documents already
    /// known to match the key.
    pub async fn watch(
        &self,
        key: WatchKey,
    ) -> Result<Subscription> {
        self.request(|reply| Command::Watch {
            key,
            since: None,
            reply,
        })
        .await?
    }

    /// Like [`Watcher::watch`], but the initial delivery only names documents
    /// whose known revno is newer than `revno`, removals included.
    pub async fn watch_since(
        &self,
        key: WatchKey,
        revno: Revno,
    ) -> Result<Subscription> {
        self.request(|reply| Command::Watch {
            key,
            since: Some(revno),
            reply,
        })
        .await?
    }

    pub async fn watch_collection(
        &self,
        collection: impl Into<String>,
    ) -> Result<Subscription> {
        self.watch(WatchKey::collection(collection)).await
    }

    pub async fn watch_entity(
        &self,
        collection: impl Into<String>,
        id: impl Into<DocumentKey>,
    ) -> Result<Subscription> {
        self.watch(WatchKey::entity(collection, id)).await
    }

    /// Forces a poll cycle that starts after this call and resolves once the
    /// records it read have been applied.
    pub async fn sync(&self) -> Result<()> {
        self.request(|reply| Command::Sync { reply }).await
    }

    pub async fn stats(&self) -> Result<WatcherStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| WatcherError::Stopped)?;
        reply_rx.await.map_err(|_| WatcherError::Stopped.into())
    }
}
