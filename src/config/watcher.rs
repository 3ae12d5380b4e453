use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Strategy applied after the change log lost its resume position
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Re-derive known revnos from a source snapshot; blanket fallback when
    /// the source cannot snapshot
    #[default]
    Snapshot,
    /// Treat every known document and every watched entity as changed
    AssumeChanged,
}

/// Configuration of the watcher core and its log reader
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Idle poll period of the change log (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Capacity of the control command queue (watch / sync / stats)
    #[serde(default = "default_command_buffer_size")]
    pub command_buffer_size: usize,

    /// Capacity of the reader -> core batch queue
    #[serde(default = "default_reader_buffer_size")]
    pub reader_buffer_size: usize,

    /// Maximum records handed to the core in one batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Reconciliation strategy after a rejected resume token
    #[serde(default)]
    pub reconcile: ReconcileMode,

    /// Seed known revnos from a source snapshot on start
    #[serde(default = "default_prime_from_snapshot")]
    pub prime_from_snapshot: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            command_buffer_size: default_command_buffer_size(),
            reader_buffer_size: default_reader_buffer_size(),
            max_batch_size: default_max_batch_size(),
            reconcile: ReconcileMode::default(),
            prime_from_snapshot: default_prime_from_snapshot(),
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "poll_interval_ms must be at least 1ms".into(),
            )));
        }

        if self.command_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "command_buffer_size must be greater than 0".into(),
            )));
        }

        if self.reader_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "reader_buffer_size must be greater than 0".into(),
            )));
        }

        if self.max_batch_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_batch_size must be greater than 0".into(),
            )));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// in ms; the change log is tailed every 5s when nobody asks for a sync
fn default_poll_interval_ms() -> u64 {
    5000
}
fn default_command_buffer_size() -> usize {
    1024
}
fn default_reader_buffer_size() -> usize {
    16
}
fn default_max_batch_size() -> usize {
    1024
}
fn default_prime_from_snapshot() -> bool {
    true
}
