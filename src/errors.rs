//! Watcher Error Hierarchy
//!
//! Errors are grouped by the layer that raises them: configuration, the change
//! log (source and reader), the watcher core, and the OS service capability.
//! Store-level faults never reach subscriptions as typed errors; the only thing
//! a subscriber ever observes is the terminal close of its mailbox.

use config::ConfigError;

pub use crate::changelog::ReadError;
pub use crate::changelog::SourceError;
pub use crate::service::ServiceError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Watcher lifecycle and request failures
    #[error(transparent)]
    Watcher(#[from] WatcherError),

    /// Change log read failures surfaced outside the reader thread
    #[error(transparent)]
    Read(#[from] ReadError),

    /// OS service management failures
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Unrecoverable failures; the watcher has shut down
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// The core loop is gone (shutdown or fatal store failure)
    #[error("Watcher stopped")]
    Stopped,

    /// A watch key names an empty collection or document id
    #[error("Invalid watch key: {0}")]
    InvalidWatchKey(String),

    /// The reader thread could not be spawned or exited unexpectedly
    #[error("Log reader unavailable: {0}")]
    ReaderUnavailable(String),
}

impl Error {
    /// True when the error means the watcher is no longer serving requests.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::Fatal(_) | Error::Watcher(WatcherError::Stopped) | Error::Read(ReadError::Fatal(_))
        )
    }
}
