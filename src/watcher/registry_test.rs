use std::sync::Arc;

use super::*;

fn registered(
    registry: &mut Registry,
    id: u64,
    key: WatchKey,
) -> Arc<Mailbox> {
    let mailbox = Arc::new(Mailbox::new());
    registry.insert(SubscriptionId(id), key, mailbox.clone());
    mailbox
}

#[test]
fn matching_reaches_entity_and_collection_watchers() {
    let mut registry = Registry::new();
    let entity = registered(&mut registry, 1, WatchKey::entity("machines", "0"));
    let other = registered(&mut registry, 2, WatchKey::entity("machines", "1"));
    let whole = registered(&mut registry, 3, WatchKey::collection("machines"));
    let units = registered(&mut registry, 4, WatchKey::collection("units"));

    let mut hits = 0;
    registry.for_each_matching("machines", "0", |mailbox| {
        mailbox.mark("0");
        hits += 1;
    });

    assert_eq!(hits, 2);
    assert_eq!(entity.pending_len(), 1);
    assert_eq!(whole.pending_len(), 1);
    assert_eq!(other.pending_len(), 0);
    assert_eq!(units.pending_len(), 0);
}

#[test]
fn remove_clears_every_index() {
    let mut registry = Registry::new();
    registered(&mut registry, 1, WatchKey::entity("machines", "0"));
    registered(&mut registry, 2, WatchKey::collection("machines"));
    assert_eq!(registry.watched_keys(), 2);
    assert_eq!(registry.entity_collections(), 1);

    assert!(registry.remove(SubscriptionId(1)));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.watched_keys(), 1);
    assert_eq!(registry.entity_collections(), 0);

    // Idempotent
    assert!(!registry.remove(SubscriptionId(1)));
    assert!(registry.remove(SubscriptionId(2)));
    assert_eq!(registry.watched_keys(), 0);
}

#[test]
fn shared_key_survives_removal_of_one_watcher() {
    let mut registry = Registry::new();
    registered(&mut registry, 1, WatchKey::entity("machines", "0"));
    let second = registered(&mut registry, 2, WatchKey::entity("machines", "0"));

    registry.remove(SubscriptionId(1));

    registry.for_each_matching("machines", "0", |mailbox| {
        mailbox.mark("0");
    });
    assert_eq!(second.pending_len(), 1);
    assert_eq!(registry.entity_collections(), 1);
}

#[test]
fn for_each_entity_skips_collection_watchers() {
    let mut registry = Registry::new();
    registered(&mut registry, 1, WatchKey::entity("machines", "0"));
    registered(&mut registry, 2, WatchKey::entity("units", "a"));
    let whole = registered(&mut registry, 3, WatchKey::collection("machines"));

    let mut ids = Vec::new();
    registry.for_each_entity(|id, mailbox| {
        mailbox.mark(id);
        ids.push(id.to_string());
    });
    ids.sort();

    assert_eq!(ids, vec!["0".to_string(), "a".to_string()]);
    assert_eq!(whole.pending_len(), 0);
}

#[test]
fn close_all_closes_mailboxes_and_empties_registry() {
    let mut registry = Registry::new();
    let first = registered(&mut registry, 1, WatchKey::entity("machines", "0"));
    let second = registered(&mut registry, 2, WatchKey::collection("units"));
    first.mark("0");

    assert_eq!(registry.close_all(CloseReason::Shutdown), 2);

    assert_eq!(registry.len(), 0);
    assert_eq!(registry.watched_keys(), 0);
    assert_eq!(first.close_reason(), Some(CloseReason::Shutdown));
    assert_eq!(second.close_reason(), Some(CloseReason::Shutdown));
    // Observed changes stay drainable after a watcher-side close
    assert_eq!(first.pending_len(), 1);
}
