use std::collections::BTreeMap;
use std::collections::HashMap;

use super::WatchKey;
use crate::changelog::ChangeRecord;
use crate::changelog::DocRef;
use crate::changelog::DocumentKey;
use crate::changelog::Revno;

/// Last revision the core has observed for a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownRevision {
    pub revno: Revno,
    pub removed: bool,
}

/// Last observed revno per (collection, id).
///
/// Revnos only ever move forward; a record at or below the known revno is a
/// replay and is ignored. Documents are grouped by collection so that
/// collection-wide catch-up does not scan unrelated collections.
///
/// Removed documents are kept as tombstones and never evicted, so memory
/// grows with the number of distinct ids ever observed. The tombstone is
/// what rejects a replayed record from before the removal and what lets
/// `watch_since` report the removal.
#[derive(Debug, Default)]
pub struct KnownState {
    collections: HashMap<String, BTreeMap<DocumentKey, KnownRevision>>,
    len: usize,
}

impl KnownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `record` if it is newer than what is known.
    /// Returns `false` for stale or duplicate records.
    pub fn observe(
        &mut self,
        record: &ChangeRecord,
    ) -> bool {
        let docs = self.collections.entry(record.collection.clone()).or_default();
        match docs.get_mut(&record.id) {
            Some(known) if record.revno <= known.revno => false,
            Some(known) => {
                known.revno = record.revno;
                known.removed = record.removed;
                true
            }
            None => {
                docs.insert(
                    record.id.clone(),
                    KnownRevision {
                        revno: record.revno,
                        removed: record.removed,
                    },
                );
                self.len += 1;
                true
            }
        }
    }

    pub fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Option<KnownRevision> {
        self.collections.get(collection).and_then(|docs| docs.get(id)).copied()
    }

    /// Ids matching `key` that a new subscription must hear about at once.
    ///
    /// Without `since`, live documents are reported. With `since`, every
    /// document (removed ones included) whose revno is newer than `since`.
    pub fn catch_up(
        &self,
        key: &WatchKey,
        since: Option<Revno>,
    ) -> Vec<DocumentKey> {
        let wanted = |known: &KnownRevision| match since {
            None => !known.removed,
            Some(revno) => known.revno > revno,
        };

        match key {
            WatchKey::Collection(collection) => self
                .collections
                .get(collection)
                .map(|docs| {
                    docs.iter()
                        .filter(|(_, known)| wanted(known))
                        .map(|(id, _)| id.clone())
                        .collect()
                })
                .unwrap_or_default(),
            WatchKey::Entity(collection, id) => match self.get(collection, id) {
                Some(known) if wanted(&known) => vec![id.clone()],
                _ => Vec::new(),
            },
        }
    }

    /// Every known document
    pub fn docs(&self) -> impl Iterator<Item = (DocRef, KnownRevision)> + '_ {
        self.collections.iter().flat_map(|(collection, docs)| {
            docs.iter()
                .map(move |(id, known)| (DocRef::new(collection.clone(), id.clone()), *known))
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
