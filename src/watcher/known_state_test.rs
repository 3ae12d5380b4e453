use super::*;
use crate::changelog::ChangeRecord;

#[test]
fn observe_accepts_only_newer_revnos() {
    let mut known = KnownState::new();

    assert!(known.observe(&ChangeRecord::new("machines", "0", 1)));
    assert!(known.observe(&ChangeRecord::new("machines", "0", 3)));
    assert!(!known.observe(&ChangeRecord::new("machines", "0", 3)));
    assert!(!known.observe(&ChangeRecord::new("machines", "0", 2)));

    assert_eq!(
        known.get("machines", "0"),
        Some(KnownRevision {
            revno: 3,
            removed: false
        })
    );
    assert_eq!(known.len(), 1);
}

#[test]
fn removal_is_tracked_with_its_sentinel_revno() {
    let mut known = KnownState::new();
    known.observe(&ChangeRecord::new("machines", "0", 4));
    assert!(known.observe(&ChangeRecord::removal("machines", "0", 4)));

    let rev = known.get("machines", "0").unwrap();
    assert!(rev.removed);
    assert_eq!(rev.revno, 5);
}

#[test]
fn removed_documents_stay_as_tombstones() {
    let mut known = KnownState::new();
    known.observe(&ChangeRecord::new("machines", "0", 2));
    known.observe(&ChangeRecord::removal("machines", "0", 2));

    // A replay from before the removal is still rejected
    assert!(!known.observe(&ChangeRecord::new("machines", "0", 2)));
    assert_eq!(known.len(), 1);
    assert_eq!(
        known.catch_up(&WatchKey::entity("machines", "0"), Some(2)),
        vec!["0".to_string()]
    );
}

#[test]
fn collection_catch_up_lists_live_documents() {
    let mut known = KnownState::new();
    known.observe(&ChangeRecord::new("machines", "0", 1));
    known.observe(&ChangeRecord::new("machines", "1", 2));
    known.observe(&ChangeRecord::removal("machines", "2", 1));
    known.observe(&ChangeRecord::new("units", "a", 1));

    let ids = known.catch_up(&WatchKey::collection("machines"), None);
    assert_eq!(ids, vec!["0".to_string(), "1".to_string()]);
}

#[test]
fn entity_catch_up_reports_known_live_document() {
    let mut known = KnownState::new();
    known.observe(&ChangeRecord::new("machines", "0", 1));

    assert_eq!(
        known.catch_up(&WatchKey::entity("machines", "0"), None),
        vec!["0".to_string()]
    );
    assert!(known.catch_up(&WatchKey::entity("machines", "9"), None).is_empty());
}

#[test]
fn catch_up_since_revno_reports_only_newer_documents() {
    let mut known = KnownState::new();
    known.observe(&ChangeRecord::new("machines", "0", 3));
    known.observe(&ChangeRecord::new("machines", "1", 7));
    known.observe(&ChangeRecord::removal("machines", "2", 8));

    assert!(known
        .catch_up(&WatchKey::entity("machines", "0"), Some(3))
        .is_empty());
    assert_eq!(
        known.catch_up(&WatchKey::entity("machines", "0"), Some(2)),
        vec!["0".to_string()]
    );
    assert_eq!(
        known.catch_up(&WatchKey::collection("machines"), Some(5)),
        vec!["1".to_string(), "2".to_string()]
    );
}

#[test]
fn docs_iterates_every_collection() {
    let mut known = KnownState::new();
    known.observe(&ChangeRecord::new("machines", "0", 1));
    known.observe(&ChangeRecord::new("units", "a", 1));

    let mut docs: Vec<_> = known.docs().map(|(doc, _)| doc.to_string()).collect();
    docs.sort();
    assert_eq!(docs, vec!["machines/0", "units/a"]);
}
