//! In-memory change log.
//!
//! Behaves like a capped, append-only store change log: entries get strictly
//! increasing positions, revnos increase per document, old entries can be
//! truncated (which expires resume tokens pointing before the cut), open
//! cursors can be invalidated, and faults can be queued for the next reads.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::ChangeCursor;
use super::ChangeRecord;
use super::ChangeSource;
use super::DocRef;
use super::LogEntry;
use super::ResumeToken;
use super::Revno;
use super::Snapshot;
use super::SourceError;

#[derive(Debug, Clone, Copy)]
struct DocState {
    revno: Revno,
    removed: bool,
}

#[derive(Debug, Default)]
struct MemLogInner {
    entries: VecDeque<LogEntry>,
    /// Position of the newest entry; positions start at 1
    last_position: u64,
    /// Entries at or below this position have been truncated
    truncated_through: Option<u64>,
    docs: BTreeMap<DocRef, DocState>,
    /// Bumped by `invalidate_cursors`
    generation: u64,
    read_faults: VecDeque<SourceError>,
    open_faults: VecDeque<SourceError>,
    snapshot_faults: VecDeque<SourceError>,
    supports_snapshot: bool,
}

/// Shared handle to an in-memory change log
#[derive(Debug, Clone, Default)]
pub struct MemChangeLog {
    inner: Arc<Mutex<MemLogInner>>,
}

impl MemChangeLog {
    /// Log that can open cursors but cannot snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Log that also answers `snapshot()`
    pub fn with_snapshots() -> Self {
        let log = Self::default();
        log.inner.lock().supports_snapshot = true;
        log
    }

    /// Creates or updates a document, returning the committed revno.
    pub fn upsert(
        &self,
        collection: &str,
        id: &str,
    ) -> Revno {
        let mut inner = self.inner.lock();
        let doc = DocRef::new(collection, id);
        let revno = inner.docs.get(&doc).map_or(1, |d| d.revno + 1);
        inner.docs.insert(doc, DocState { revno, removed: false });
        inner.push(ChangeRecord::new(collection, id, revno));
        revno
    }

    /// Removes a document; returns the removal revno or `None` if unknown.
    pub fn remove(
        &self,
        collection: &str,
        id: &str,
    ) -> Option<Revno> {
        let mut inner = self.inner.lock();
        let doc = DocRef::new(collection, id);
        let state = inner.docs.get(&doc).copied()?;
        if state.removed {
            return None;
        }
        let record = ChangeRecord::removal(collection, id, state.revno);
        let revno = record.revno;
        inner.docs.insert(doc, DocState { revno, removed: true });
        inner.push(record);
        Some(revno)
    }

    /// Appends a raw record, e.g. a duplicate replayed by the store.
    pub fn append(
        &self,
        record: ChangeRecord,
    ) -> ResumeToken {
        let mut inner = self.inner.lock();
        let doc = record.doc_ref();
        let newer = inner.docs.get(&doc).map_or(true, |d| record.revno > d.revno);
        if newer {
            inner.docs.insert(
                doc,
                DocState {
                    revno: record.revno,
                    removed: record.removed,
                },
            );
        }
        inner.push(record)
    }

    /// Drops every entry up to and including `through`.
    pub fn truncate_through(
        &self,
        through: ResumeToken,
    ) {
        let mut inner = self.inner.lock();
        while inner.entries.front().is_some_and(|e| e.token <= through) {
            inner.entries.pop_front();
        }
        let cut = through.position().max(inner.truncated_through.unwrap_or(0));
        inner.truncated_through = Some(cut);
        trace!(through = %through, "mem change log truncated");
    }

    /// Every open cursor fails its next read with `CursorInvalidated`.
    pub fn invalidate_cursors(&self) {
        self.inner.lock().generation += 1;
    }

    /// Queues a fault returned by the next cursor read.
    pub fn fail_next_read(
        &self,
        error: SourceError,
    ) {
        self.inner.lock().read_faults.push_back(error);
    }

    /// Queues a fault returned by the next `open_cursor`.
    pub fn fail_next_open(
        &self,
        error: SourceError,
    ) {
        self.inner.lock().open_faults.push_back(error);
    }

    /// Queues a fault returned by the next `snapshot`.
    pub fn fail_next_snapshot(
        &self,
        error: SourceError,
    ) {
        self.inner.lock().snapshot_faults.push_back(error);
    }

    /// Position of the newest entry
    pub fn head(&self) -> Option<ResumeToken> {
        let inner = self.inner.lock();
        (inner.last_position > 0).then(|| ResumeToken::new(inner.last_position))
    }

    /// Current revno of a document
    pub fn revno(
        &self,
        collection: &str,
        id: &str,
    ) -> Option<Revno> {
        self.inner.lock().docs.get(&DocRef::new(collection, id)).map(|d| d.revno)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemLogInner {
    fn push(
        &mut self,
        record: ChangeRecord,
    ) -> ResumeToken {
        self.last_position += 1;
        let token = ResumeToken::new(self.last_position);
        self.entries.push_back(LogEntry { token, record });
        token
    }
}

/// Cursor over a [`MemChangeLog`]
#[derive(Debug)]
pub struct MemCursor {
    inner: Arc<Mutex<MemLogInner>>,
    opened_after: ResumeToken,
    after: ResumeToken,
    generation: u64,
}

impl ChangeCursor for MemCursor {
    fn next_entry(&mut self) -> Result<Option<LogEntry>, SourceError> {
        let mut inner = self.inner.lock();
        if let Some(fault) = inner.read_faults.pop_front() {
            return Err(fault);
        }
        if inner.generation != self.generation {
            return Err(SourceError::CursorInvalidated);
        }
        if inner.truncated_through.is_some_and(|cut| self.after.position() < cut) {
            return Err(SourceError::PositionExpired(self.after));
        }

        let next = inner.entries.iter().find(|e| e.token > self.after).cloned();
        if let Some(entry) = &next {
            self.after = entry.token;
        }
        Ok(next)
    }

    fn resume_point(&self) -> ResumeToken {
        self.opened_after
    }
}

impl ChangeSource for MemChangeLog {
    type Cursor = MemCursor;

    fn open_cursor(
        &self,
        after: Option<ResumeToken>,
    ) -> Result<Self::Cursor, SourceError> {
        let mut inner = self.inner.lock();
        if let Some(fault) = inner.open_faults.pop_front() {
            return Err(fault);
        }
        let after = match after {
            Some(after) => {
                if inner.truncated_through.is_some_and(|cut| after.position() < cut) {
                    return Err(SourceError::PositionExpired(after));
                }
                after
            }
            None => inner
                .truncated_through
                .map_or(ResumeToken::ORIGIN, ResumeToken::new),
        };
        Ok(MemCursor {
            inner: self.inner.clone(),
            opened_after: after,
            after,
            generation: inner.generation,
        })
    }

    fn snapshot(&self) -> Result<Option<Snapshot>, SourceError> {
        let mut inner = self.inner.lock();
        if let Some(fault) = inner.snapshot_faults.pop_front() {
            return Err(fault);
        }
        if !inner.supports_snapshot {
            return Ok(None);
        }
        let records = inner
            .docs
            .iter()
            .map(|(doc, state)| ChangeRecord {
                collection: doc.collection.clone(),
                id: doc.id.clone(),
                revno: state.revno,
                removed: state.removed,
            })
            .collect();
        let token = Some(ResumeToken::new(inner.last_position));
        Ok(Some(Snapshot { records, token }))
    }
}
