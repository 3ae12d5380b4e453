//! Change log access: the committed-change records produced by the backing
//! store, the cursor abstraction over them, and the [`LogReader`] that turns a
//! cursor into classified, resumable batches.
//!
//! The store itself is out of scope. It only has to implement
//! [`ChangeSource`], which acts as the iterator factory: it opens cursors
//! positioned after a [`ResumeToken`] and may optionally provide a snapshot of
//! the latest revno per document.

mod log_reader;
mod mem_changelog;


use std::fmt;

pub use log_reader::*;
pub use mem_changelog::*;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

/// Identifier of a document inside a collection
pub type DocumentKey = String;

/// Per-document revision counter
pub type Revno = i64;

/// One committed mutation of a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub collection: String,
    pub id: DocumentKey,
    pub revno: Revno,
    /// The document was removed; `revno` lies beyond its last live revno
    pub removed: bool,
}

impl ChangeRecord {
    pub fn new(
        collection: impl Into<String>,
        id: impl Into<DocumentKey>,
        revno: Revno,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            revno,
            removed: false,
        }
    }

    /// Removal record following the document's last live revno
    pub fn removal(
        collection: impl Into<String>,
        id: impl Into<DocumentKey>,
        last_live_revno: Revno,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            revno: last_live_revno.saturating_add(1),
            removed: true,
        }
    }

    pub fn doc_ref(&self) -> DocRef {
        DocRef::new(self.collection.clone(), self.id.clone())
    }
}

/// A (collection, id) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocRef {
    pub collection: String,
    pub id: DocumentKey,
}

impl DocRef {
    pub fn new(
        collection: impl Into<String>,
        id: impl Into<DocumentKey>,
    ) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocRef {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Opaque position of a committed log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResumeToken(u64);

impl ResumeToken {
    /// Position before the first entry a log ever held. Sources number
    /// entries from 1, so once anything has been truncated this token is
    /// expired.
    pub const ORIGIN: ResumeToken = ResumeToken(0);

    pub fn new(position: u64) -> Self {
        Self(position)
    }

    pub fn position(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A record together with its log position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub token: ResumeToken,
    pub record: ChangeRecord,
}

/// Latest revno of every document the source still holds, and the log
/// position the snapshot is consistent with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub records: Vec<ChangeRecord>,
    pub token: Option<ResumeToken>,
}

/// Failures raised by a change source, before classification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Temporary store or network fault
    #[error("Transient source failure: {0}")]
    Transient(String),

    /// The cursor became unreadable; reopening from a resume point may succeed
    #[error("Cursor invalidated")]
    CursorInvalidated,

    /// The requested resume position is no longer retained by the store
    #[error("Resume position {0} expired")]
    PositionExpired(ResumeToken),

    /// Unrecoverable store failure
    #[error("Source failure: {0}")]
    Fatal(String),
}

/// Classified change log read failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// Retry with backoff; no subscriber impact beyond latency
    #[error("Retryable read failure: {0}")]
    Retryable(String),

    /// The store no longer honours the resume token; reconcile
    #[error("Resume token {0} rejected")]
    ResumeRejected(ResumeToken),

    /// The watcher must shut down
    #[error("Fatal read failure: {0}")]
    Fatal(String),
}

impl From<SourceError> for ReadError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Transient(reason) => ReadError::Retryable(reason),
            SourceError::CursorInvalidated => ReadError::Retryable("cursor invalidated".to_string()),
            SourceError::PositionExpired(token) => ReadError::ResumeRejected(token),
            SourceError::Fatal(reason) => ReadError::Fatal(reason),
        }
    }
}

/// Cursor over committed log entries, in commit order
#[cfg_attr(test, automock)]
pub trait ChangeCursor: Send {
    /// Next entry, `Ok(None)` when the cursor is caught up with the log head
    fn next_entry(&mut self) -> Result<Option<LogEntry>, SourceError>;

    /// Position the cursor was opened after. For a cursor opened from the
    /// oldest retained entry this is the position just before it, so a
    /// reader that resumes from here notices a later truncation.
    fn resume_point(&self) -> ResumeToken;
}

/// The backing store's change log, seen as an iterator factory
#[cfg_attr(test, automock(type Cursor = MockChangeCursor;))]
pub trait ChangeSource: Send + Sync + 'static {
    type Cursor: ChangeCursor + 'static;

    /// Opens a cursor yielding entries strictly after `after`
    /// (from the oldest retained entry when `None`).
    fn open_cursor(
        &self,
        after: Option<ResumeToken>,
    ) -> Result<Self::Cursor, SourceError>;

    /// Latest revno per document, `Ok(None)` if the store cannot snapshot.
    fn snapshot(&self) -> Result<Option<Snapshot>, SourceError>;
}
