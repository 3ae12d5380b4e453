//! Configuration management for the state change watcher.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`STATEWATCH__` prefix)
//! - Component-wise validation

mod retry;
mod watcher;
pub use retry::*;
pub use watcher::*;

#[cfg(test)]
mod watcher_test;

use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_ENV_PREFIX;
use crate::constants::CONFIG_PATH_ENV;
use crate::Result;

/// Main configuration container for the watcher
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct StatewatchConfig {
    /// Core loop, batching and reconciliation parameters
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// Retry policies for change log access
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl Debug for StatewatchConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StatewatchConfig")
            .field("watcher", &self.watcher)
            .field("retry", &self.retry)
            .finish()
    }
}

impl StatewatchConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Sources are merged in order, later ones override earlier ones:
    /// 1. Type defaults
    /// 2. File named by the `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with the `STATEWATCH__` prefix
    ///
    /// Callers MUST call `validate()` once all overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("STATEWATCH__WATCHER__POLL_INTERVAL_MS", "200");
    /// let cfg = StatewatchConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(Self::env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order: current values, then the file, then the environment.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(Self::env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.watcher.validate()?;
        self.retry.validate()?;
        Ok(self)
    }

    fn env_source() -> Environment {
        Environment::with_prefix(CONFIG_ENV_PREFIX)
            .separator("__")
            .ignore_empty(true)
            .try_parsing(true)
    }
}
