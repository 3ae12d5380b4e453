/// Thread name of the dedicated change log reader
pub(crate) const READER_THREAD_NAME: &str = "statewatch-log-reader";

/// Environment prefix for configuration overrides, e.g. `STATEWATCH__WATCHER__POLL_INTERVAL_MS`
pub(crate) const CONFIG_ENV_PREFIX: &str = "STATEWATCH";

/// Environment variable naming an optional configuration file
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

// Reconciliation strategy labels, used in logs and metrics
pub(crate) const RECONCILE_SNAPSHOT: &str = "snapshot";
pub(crate) const RECONCILE_ASSUME_CHANGED: &str = "assume_changed";
