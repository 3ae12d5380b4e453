use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::CloseReason;
use super::Mailbox;
use super::SubscriptionId;
use super::WatchKey;

#[derive(Debug)]
struct Registered {
    key: WatchKey,
    mailbox: Arc<Mailbox>,
}

/// Subscription indexes, owned by the core loop.
///
/// `by_key` answers "who watches Entity(c, id) / Collection(c)" for each
/// applied record; `entities_by_collection` lists the entity watches inside a
/// collection for reconciliation and stats.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    subscriptions: HashMap<SubscriptionId, Registered>,
    by_key: HashMap<WatchKey, BTreeSet<SubscriptionId>>,
    entities_by_collection: HashMap<String, BTreeSet<SubscriptionId>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(
        &mut self,
        id: SubscriptionId,
        key: WatchKey,
        mailbox: Arc<Mailbox>,
    ) {
        self.by_key.entry(key.clone()).or_default().insert(id);
        if let WatchKey::Entity(collection, _) = &key {
            self.entities_by_collection
                .entry(collection.clone())
                .or_default()
                .insert(id);
        }
        trace!(subscription_id = id.0, key = %key, "subscription registered");
        self.subscriptions.insert(id, Registered { key, mailbox });
    }

    /// Removes `id` from every index. Returns `false` if it was not registered.
    pub(crate) fn remove(
        &mut self,
        id: SubscriptionId,
    ) -> bool {
        let Some(registered) = self.subscriptions.remove(&id) else {
            return false;
        };

        remove_from(&mut self.by_key, &registered.key, id);
        if let WatchKey::Entity(collection, _) = &registered.key {
            remove_from(&mut self.entities_by_collection, collection, id);
        }
        trace!(subscription_id = id.0, key = %registered.key, "subscription unregistered");
        true
    }

    /// Calls `f` for every subscription interested in document (collection, id).
    pub(crate) fn for_each_matching(
        &self,
        collection: &str,
        id: &str,
        mut f: impl FnMut(&Mailbox),
    ) {
        let entity = WatchKey::entity(collection, id);
        let whole = WatchKey::collection(collection);
        for key in [&entity, &whole] {
            if let Some(ids) = self.by_key.get(key) {
                for sub_id in ids {
                    if let Some(registered) = self.subscriptions.get(sub_id) {
                        f(&registered.mailbox);
                    }
                }
            }
        }
    }

    /// Calls `f` with the watched document id of every entity subscription.
    pub(crate) fn for_each_entity(
        &self,
        mut f: impl FnMut(&str, &Mailbox),
    ) {
        for ids in self.entities_by_collection.values() {
            for sub_id in ids {
                if let Some(Registered {
                    key: WatchKey::Entity(_, doc_id),
                    mailbox,
                }) = self.subscriptions.get(sub_id)
                {
                    f(doc_id, mailbox);
                }
            }
        }
    }

    /// Closes and forgets every subscription.
    pub(crate) fn close_all(
        &mut self,
        reason: CloseReason,
    ) -> usize {
        let closed = self.subscriptions.len();
        for registered in self.subscriptions.values() {
            registered.mailbox.close(reason);
        }
        self.subscriptions.clear();
        self.by_key.clear();
        self.entities_by_collection.clear();
        closed
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn watched_keys(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn entity_collections(&self) -> usize {
        self.entities_by_collection.len()
    }
}

fn remove_from<K>(
    index: &mut HashMap<K, BTreeSet<SubscriptionId>>,
    key: &K,
    id: SubscriptionId,
) where
    K: std::hash::Hash + Eq,
{
    if let Some(ids) = index.get_mut(key) {
        ids.remove(&id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}
