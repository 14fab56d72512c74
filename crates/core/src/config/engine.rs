// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration
//!
//! Read once at startup and immutable for the engine's lifetime. Durations
//! are written as humantime strings (`"1s"`, `"5m"`).

use crate::task::RetryBackoff;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of simultaneously running task runs
    pub max_tasks: usize,
    /// Scheduler loop granularity
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    pub default_backoff: RetryBackoff,
    pub default_max_retries: u32,
    /// Bytes of action output kept per run
    pub output_cap: usize,
    /// Terminal runs kept per task
    pub run_retention: usize,
    /// Durable store directory
    pub data_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tasks: 4,
            tick_interval: Duration::from_secs(1),
            default_timeout: Duration::from_secs(60),
            default_backoff: RetryBackoff::default(),
            default_max_retries: 0,
            output_cap: 64 * 1024,
            run_retention: 20,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tasks == 0 {
            return Err(ConfigError::Zero("max_tasks"));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Zero("tick_interval"));
        }
        if self.default_timeout.is_zero() {
            return Err(ConfigError::Zero("default_timeout"));
        }
        Ok(())
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
