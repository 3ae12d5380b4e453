use std::sync::Arc;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ChangeCursor;
use super::ChangeRecord;
use super::ChangeSource;
use super::ReadError;
use super::ResumeToken;
use super::Snapshot;
use super::SourceError;

/// Records read in one `next()` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBatch {
    pub records: Vec<ChangeRecord>,
    /// Position of the last record in the batch, `None` for an empty batch
    pub token: Option<ResumeToken>,
}

impl LogBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads a [`ChangeSource`] in bounded, classified, resumable batches.
///
/// The committed token only moves forward through [`LogReader::commit`], which
/// the caller invokes once a batch has been handed over. Any retryable fault
/// drops the cursor, so the next read reopens from the committed token and
/// re-reads whatever was not handed over yet.
pub struct LogReader<S: ChangeSource> {
    source: Arc<S>,
    cursor: Option<S::Cursor>,
    committed: Option<ResumeToken>,
    max_batch_size: usize,
}

impl<S: ChangeSource> std::fmt::Debug for LogReader<S> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("committed", &self.committed)
            .field("cursor_open", &self.cursor.is_some())
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

impl<S: ChangeSource> LogReader<S> {
    /// Creates a reader resuming after `resume` (from the oldest retained
    /// entry when `None`). The cursor is opened lazily by `next()`.
    pub fn new(
        source: Arc<S>,
        resume: Option<ResumeToken>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            source,
            cursor: None,
            committed: resume,
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn resume_token(&self) -> Option<ResumeToken> {
        self.committed
    }

    /// Reads up to `max_batch_size` records in commit order.
    pub fn next(&mut self) -> Result<LogBatch, ReadError> {
        if self.cursor.is_none() {
            let cursor = self.source.open_cursor(self.committed).map_err(|e| {
                debug!(resume = ?self.committed, "open cursor failed: {:?}", e);
                ReadError::from(e)
            })?;
            if self.committed.is_none() {
                // Pin the start so a truncation before the next read is detected
                self.committed = Some(cursor.resume_point());
            }
            trace!(resume = ?self.committed, "cursor opened");
            self.cursor = Some(cursor);
        }

        let mut batch = LogBatch::default();
        while batch.records.len() < self.max_batch_size {
            let next = match self.cursor.as_mut() {
                Some(cursor) => cursor.next_entry(),
                None => break,
            };

            match next {
                Ok(Some(entry)) => {
                    if self.committed.is_some_and(|c| entry.token <= c) {
                        trace!(token = %entry.token, "skip entry at or before committed position");
                        continue;
                    }
                    batch.token = Some(entry.token);
                    batch.records.push(entry.record);
                }
                Ok(None) => break,
                Err(e) => {
                    // Partial batch is dropped and re-read after reopen
                    self.cursor = None;
                    if matches!(e, SourceError::PositionExpired(_)) {
                        warn!(resume = ?self.committed, "resume position expired while reading");
                    } else {
                        debug!(resume = ?self.committed, "cursor read failed: {:?}", e);
                    }
                    return Err(ReadError::from(e));
                }
            }
        }

        Ok(batch)
    }

    /// Marks everything up to `token` as handed over.
    pub fn commit(
        &mut self,
        token: ResumeToken,
    ) {
        if self.committed.map_or(true, |c| token > c) {
            self.committed = Some(token);
        }
    }

    /// Drops the cursor; the next read reopens from the committed token.
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    /// Abandons the resume position and restarts from the source's snapshot
    /// point (or from the oldest retained entry when the source cannot
    /// snapshot). Returns the snapshot for reconciliation.
    pub fn reopen_fresh(&mut self) -> Result<Option<Snapshot>, ReadError> {
        self.cursor = None;
        let snapshot = self.source.snapshot().map_err(ReadError::from)?;
        self.committed = snapshot.as_ref().and_then(|s| s.token);
        debug!(resume = ?self.committed, has_snapshot = snapshot.is_some(), "log reader reopened fresh");
        Ok(snapshot)
    }

    /// Snapshot used to prime known state at start; moves the resume position
    /// to the snapshot point when one is available.
    pub fn prime(&mut self) -> Result<Option<Snapshot>, ReadError> {
        let snapshot = self.source.snapshot().map_err(ReadError::from)?;
        if let Some(snapshot) = &snapshot {
            self.cursor = None;
            if snapshot.token.is_some() {
                self.committed = snapshot.token;
            }
        }
        Ok(snapshot)
    }
}
