//! Runtime configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (FLOWRT_WORKERS, FLOWRT_LOG)
//! 3. RON file (--config)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust
//! use flowrt::util::config::RuntimeConfig;
//!
//! let mut config = RuntimeConfig::default();
//! config.apply_env();
//! config.validate().unwrap();
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Environment variable overriding the worker count.
pub const ENV_WORKERS: &str = "FLOWRT_WORKERS";
/// Environment variable overriding the log level.
pub const ENV_LOG: &str = "FLOWRT_LOG";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads, one workpile each
    pub workers: usize,
    /// Waiter nodes shared by every event
    pub waiter_pool_capacity: u32,
    /// Handle table slots
    pub guid_capacity: u32,
    /// Sleep of an idle worker once its backoff is exhausted
    pub idle_timeout_ms: u64,
    /// Byte budget for data blocks; unlimited when unset
    pub memory_budget: Option<usize>,
    /// trace, debug, info, warn or error
    pub log_level: String,
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            waiter_pool_capacity: 1 << 16,
            guid_capacity: 1 << 16,
            idle_timeout_ms: 1,
            memory_budget: None,
            log_level: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Config with `workers` threads and defaults elsewhere.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    /// Load a RON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = ron::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given and present, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Apply `FLOWRT_WORKERS` and `FLOWRT_LOG` from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup`. Unparsable values are ignored.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) {
        if let Some(workers) = lookup(ENV_WORKERS).and_then(|v| v.trim().parse().ok()) {
            self.workers = workers;
        }
        if let Some(level) = lookup(ENV_LOG) {
            let level = level.trim();
            if !level.is_empty() {
                self.log_level = level.to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.waiter_pool_capacity == 0 {
            return Err(ConfigError::Invalid("waiter_pool_capacity must be at least 1".into()));
        }
        if self.guid_capacity == 0 {
            return Err(ConfigError::Invalid("guid_capacity must be at least 1".into()));
        }
        if self.log_level.parse::<crate::util::logger::LogLevel>().is_err() {
            return Err(ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)));
        }
        Ok(())
    }

    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Pretty RON rendering, as accepted by [`load`](Self::load).
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("config serialize error: {0}")]
    Serialize(#[from] ron::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
