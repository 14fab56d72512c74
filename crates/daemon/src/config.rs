// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration file and path resolution

use cg_core::{EngineConfig, Plan, PlanBook};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment override for the state directory
pub const STATE_DIR_ENV: &str = "CG_STATE_DIR";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine state directory")]
    NoStateDir,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Engine(#[from] cg_core::ConfigError),
    #[error(transparent)]
    Plan(#[from] cg_core::PlanError),
}

/// On-disk shape; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    state_dir: Option<PathBuf>,
    socket_path: Option<PathBuf>,
    log_path: Option<PathBuf>,
    lock_path: Option<PathBuf>,
    engine: EngineConfig,
    plans: BTreeMap<String, Plan>,
}

/// Resolved daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Engine settings; `data_dir` is absolute after resolution
    pub engine: EngineConfig,
    /// Plans served by the `plan` action kind, from `[plans.<name>]`
    pub plans: PlanBook,
}

impl DaemonConfig {
    /// Load from `path`, or from `<state dir>/config.toml` when it exists,
    /// or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_dir = default_state_dir()?;
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(default_dir.join(CONFIG_FILE)).filter(|p| p.exists()),
        };
        let file = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                toml::from_str(&text)?
            }
            None => ConfigFile::default(),
        };
        Self::resolve(file, default_dir)
    }

    /// Parse a config document, resolving relative paths against the state dir
    pub fn from_toml(text: &str, default_dir: &Path) -> Result<Self, ConfigError> {
        Self::resolve(toml::from_str(text)?, default_dir.to_path_buf())
    }

    fn resolve(file: ConfigFile, default_dir: PathBuf) -> Result<Self, ConfigError> {
        let state_dir = file.state_dir.unwrap_or(default_dir);
        let under_state = |p: Option<PathBuf>, name: &str| match p {
            Some(p) if p.is_absolute() => p,
            Some(p) => state_dir.join(p),
            None => state_dir.join(name),
        };

        let socket_path = under_state(file.socket_path, "cgd.sock");
        let log_path = under_state(file.log_path, "cgd.log");
        let lock_path = under_state(file.lock_path, "cgd.pid");
        let data_dir = under_state(Some(file.engine.data_dir.clone()), "data");
        let engine = file.engine.with_data_dir(data_dir);
        engine.validate()?;
        let plans = PlanBook::new(file.plans)?;

        Ok(Self {
            state_dir,
            socket_path,
            log_path,
            lock_path,
            engine,
            plans,
        })
    }
}

/// `$CG_STATE_DIR`, else the platform state (or local data) dir plus `cg`
pub fn default_state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var(STATE_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join("cg"))
        .ok_or(ConfigError::NoStateDir)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
