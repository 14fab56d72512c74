// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, recovery, shutdown.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use cg_adapters::ActionResolver;
use cg_core::{PlanError, SystemClock, UuidIdGen};
use cg_engine::{Engine, EngineError};
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::server::ServerContext;

/// Startup marker prefix written to the log before anything else.
/// The CLI uses it to find where the current startup attempt begins.
/// Full format: "--- cgd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- cgd: starting (pid: ";

/// Daemon state during operation
pub struct DaemonState {
    pub config: DaemonConfig,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    /// Unix socket listener
    pub listener: UnixListener,
    /// Handed to each connection handler
    pub context: ServerContext<SystemClock, UuidIdGen>,
    scheduler_stop: CancellationToken,
    scheduler: JoinHandle<()>,
}

impl DaemonState {
    /// Stop the scheduler, interrupt in-flight runs and remove runtime files
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        self.scheduler_stop.cancel();
        if let Err(e) = self.scheduler.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }

        drop(self.listener);
        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid plan: {0}")]
    Plan(#[from] PlanError),
}

/// Start the daemon
///
/// Takes the lock before touching anything else. A failure after that point
/// removes whatever this attempt created.
pub async fn startup(config: &DaemonConfig) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    let lock_file = acquire_lock(config)?;

    match startup_inner(config, lock_file).await {
        Ok(state) => Ok(state),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

/// Lock the PID file and record our PID in it
fn acquire_lock(config: &DaemonConfig) -> Result<File, LifecycleError> {
    if let Some(parent) = config.lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Opened without truncation so a losing attempt leaves the owner's PID intact
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    Ok(lock_file)
}

async fn startup_inner(
    config: &DaemonConfig,
    lock_file: File,
) -> Result<DaemonState, LifecycleError> {
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.engine.data_dir)?;

    // Open the store and reconcile BEFORE binding so clients never see
    // half-recovered state
    let mut resolver = ActionResolver::with_defaults();
    if !config.plans.is_empty() {
        resolver.register_plans(config.plans.clone())?;
    }
    let (engine, report) = Engine::open(
        config.engine.clone(),
        resolver,
        SystemClock,
        UuidIdGen,
    )?;
    let status = engine.status()?;
    info!(
        tasks = status.tasks,
        recovered = report.interrupted,
        max_tasks = status.max_tasks,
        "Loaded task store from {}",
        config.engine.data_dir.display()
    );

    // Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    let scheduler_stop = CancellationToken::new();
    let scheduler = {
        let engine = engine.clone();
        let stop = scheduler_stop.clone();
        tokio::spawn(async move { engine.run(stop).await })
    };

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        context: ServerContext {
            engine,
            start_time: Instant::now(),
            shutdown: CancellationToken::new(),
        },
        scheduler_stop,
        scheduler,
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &DaemonConfig) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
