// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use cg_core::{RunId, TaskDefinition, TaskId, TaskPatch, TaskRun, TaskSpec, Version};
use cg_daemon::protocol::{self, ProtocolError, TaskStatus};
use cg_daemon::{DaemonConfig, Request, Response, STARTUP_MARKER_PREFIX};
use thiserror::Error;
use tokio::net::UnixStream;

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for IPC requests
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("CG_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for daemon to start
pub fn timeout_connect() -> Duration {
    parse_duration_ms("CG_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for process to exit
pub fn timeout_exit() -> Duration {
    parse_duration_ms("CG_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(5))
}

/// Polling interval for retries
pub fn poll_interval() -> Duration {
    parse_duration_ms("CG_POLL_INTERVAL_MS").unwrap_or(Duration::from_millis(50))
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("Connection timeout waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Busy(String),

    #[error("Rejected by daemon: {0}")]
    Rejected(String),

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Map a daemon error response to a client error
    fn from_response(response: Response) -> Self {
        match response {
            Response::NotFound { message } => ClientError::NotFound(message),
            Response::Conflict { message } => ClientError::Conflict(message),
            Response::Busy { message } => ClientError::Busy(message),
            Response::Error { message } => ClientError::Rejected(message),
            _ => ClientError::UnexpectedResponse,
        }
    }
}

/// Daemon uptime and load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub uptime_secs: u64,
    pub tasks: usize,
    pub running: usize,
    pub max_tasks: usize,
}

/// Daemon client
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to daemon, auto-starting if not running
    ///
    /// `config_file` is forwarded to a spawned `cgd` so both agree on paths.
    pub fn connect_or_start(
        config: &DaemonConfig,
        config_file: Option<&Path>,
    ) -> Result<Self, ClientError> {
        match Self::connect(config) {
            Ok(client) => Ok(client),
            Err(ClientError::DaemonNotRunning) => {
                let child = start_daemon_background(config_file)?;
                Self::connect_with_retry(config, timeout_connect(), child)
            }
            Err(e) => Err(wrap_with_startup_error(e, config)),
        }
    }

    /// Connect to existing daemon (no auto-start)
    pub fn connect(config: &DaemonConfig) -> Result<Self, ClientError> {
        if !config.socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }
        Ok(Self {
            socket_path: config.socket_path.clone(),
        })
    }

    fn connect_with_retry(
        config: &DaemonConfig,
        timeout: Duration,
        mut child: std::process::Child,
    ) -> Result<Self, ClientError> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            // Check if daemon process exited early (startup failure)
            if let Ok(Some(status)) = child.try_wait() {
                // Poll for startup error in log (filesystem may need to sync)
                let poll_start = Instant::now();
                while poll_start.elapsed() < timeout_exit() {
                    if let Some(err) = read_startup_error(&config.log_path) {
                        return Err(ClientError::DaemonStartFailed(err));
                    }
                    std::thread::sleep(poll_interval());
                }
                return Err(ClientError::DaemonStartFailed(format!(
                    "exited with {}",
                    status
                )));
            }

            match Self::connect(config) {
                Ok(client) => return Ok(client),
                Err(ClientError::DaemonNotRunning) => {
                    std::thread::sleep(poll_interval());
                }
                Err(e) => return Err(wrap_with_startup_error(e, config)),
            }
        }

        Err(wrap_with_startup_error(
            ClientError::DaemonStartTimeout,
            config,
        ))
    }

    /// Send a request and receive a response with specific timeouts
    async fn send_with_timeout(
        &self,
        request: Request,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(&request)?;
        tokio::time::timeout(write_timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes =
            tokio::time::timeout(read_timeout, protocol::read_message(&mut reader))
                .await
                .map_err(|_| ProtocolError::Timeout)??;

        let response: Response = protocol::decode(&response_bytes)?;
        Ok(response)
    }

    /// Send a request and receive a response
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        self.send_with_timeout(request, timeout_ipc(), timeout_ipc())
            .await
    }

    /// Get daemon version via Hello handshake
    pub async fn hello(&self) -> Result<String, ClientError> {
        match self
            .send(Request::Hello {
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .await?
        {
            Response::Hello { version } => Ok(version),
            other => Err(ClientError::from_response(other)),
        }
    }

    pub async fn status(&self) -> Result<DaemonStatus, ClientError> {
        match self.send(Request::Status).await? {
            Response::Status {
                uptime_secs,
                tasks,
                running,
                max_tasks,
            } => Ok(DaemonStatus {
                uptime_secs,
                tasks,
                running,
                max_tasks,
            }),
            other => Err(ClientError::from_response(other)),
        }
    }

    /// Request daemon shutdown
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(Request::Shutdown).await? {
            Response::Ok | Response::ShuttingDown => Ok(()),
            other => Err(ClientError::from_response(other)),
        }
    }

    pub async fn create_task(&self, spec: TaskSpec) -> Result<TaskDefinition, ClientError> {
        match self.send(Request::CreateTask { spec }).await? {
            Response::Task { task } => Ok(*task),
            other => Err(ClientError::from_response(other)),
        }
    }

    pub async fn update_task(
        &self,
        id: &TaskId,
        patch: TaskPatch,
        version: Version,
    ) -> Result<TaskDefinition, ClientError> {
        match self
            .send(Request::UpdateTask {
                id: id.clone(),
                patch,
                version,
            })
            .await?
        {
            Response::Task { task } => Ok(*task),
            other => Err(ClientError::from_response(other)),
        }
    }

    pub async fn delete_task(&self, id: &TaskId) -> Result<(), ClientError> {
        match self.send(Request::DeleteTask { id: id.clone() }).await? {
            Response::Ok => Ok(()),
            other => Err(ClientError::from_response(other)),
        }
    }

    pub async fn run_now(&self, id: &TaskId) -> Result<RunId, ClientError> {
        match self.send(Request::RunNow { id: id.clone() }).await? {
            Response::RunStarted { run_id } => Ok(run_id),
            other => Err(ClientError::from_response(other)),
        }
    }

    pub async fn cancel_run(&self, id: &TaskId) -> Result<RunId, ClientError> {
        match self.send(Request::CancelRun { id: id.clone() }).await? {
            Response::RunCancelled { run_id } => Ok(run_id),
            other => Err(ClientError::from_response(other)),
        }
    }

    pub async fn get_status(&self, id: &TaskId) -> Result<TaskStatus, ClientError> {
        match self.send(Request::GetStatus { id: id.clone() }).await? {
            Response::TaskStatus { status } => Ok(*status),
            other => Err(ClientError::from_response(other)),
        }
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskDefinition>, ClientError> {
        match self.send(Request::ListTasks).await? {
            Response::Tasks { tasks } => Ok(tasks),
            other => Err(ClientError::from_response(other)),
        }
    }

    pub async fn list_runs(&self, id: &TaskId) -> Result<Vec<TaskRun>, ClientError> {
        match self.send(Request::ListRuns { id: id.clone() }).await? {
            Response::Runs { runs } => Ok(runs),
            other => Err(ClientError::from_response(other)),
        }
    }
}

/// Start the daemon in the background, returning the child process handle
fn start_daemon_background(config_file: Option<&Path>) -> Result<std::process::Child, ClientError> {
    let cgd_path = find_cgd_binary();

    let mut command = Command::new(&cgd_path);
    if let Some(path) = config_file {
        command.arg(path);
    }
    command
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Stop the daemon (graceful first, then forceful)
/// Returns true if daemon was stopped, false if it wasn't running
pub async fn daemon_stop(config: &DaemonConfig) -> Result<bool, ClientError> {
    let client = match DaemonClient::connect(config) {
        Ok(c) => c,
        Err(ClientError::DaemonNotRunning) => return Ok(false),
        Err(e) => return Err(e),
    };

    let shutdown_result = client.shutdown().await;

    if let Some(pid) = read_daemon_pid(&config.lock_path) {
        if shutdown_result.is_ok() {
            // Graceful shutdown interrupts in-flight runs; give it time to finish
            wait_for_exit(pid, timeout_exit()).await;
        }

        if process_exists(pid) {
            force_kill_daemon(pid);
            wait_for_exit(pid, timeout_exit()).await;
        }
    }

    Ok(true)
}

/// Wait for a process to exit
async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(poll_interval()).await;
    }
    false
}

/// Find the cgd binary
fn find_cgd_binary() -> PathBuf {
    // Explicit override (used by tests to ensure correct binary)
    if let Ok(path) = std::env::var("CG_DAEMON_BINARY") {
        return PathBuf::from(path);
    }

    // Check current executable's directory
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("cgd");
            if sibling.exists() {
                return sibling;
            }
        }
    }

    // Fall back to PATH lookup
    PathBuf::from("cgd")
}

/// Get the PID from the daemon lock file, if it exists
pub fn read_daemon_pid(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok())
}

/// Check if a process with the given PID exists
pub fn process_exists(pid: u32) -> bool {
    // Use kill -0 to check if process exists without sending a signal
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Force kill a daemon process
pub fn force_kill_daemon(pid: u32) -> bool {
    Command::new("kill")
        .args(["-9", &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Read daemon log from the last startup marker, looking for errors.
/// Returns the error message if found, None otherwise.
pub fn read_startup_error(log_path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(log_path).ok()?;

    let start_pos = content.rfind(STARTUP_MARKER_PREFIX)?;
    let startup_log = &content[start_pos..];

    let errors: Vec<&str> = startup_log
        .lines()
        .filter(|line| line.contains(" ERROR ") || line.contains("Failed to start"))
        .collect();

    if errors.is_empty() {
        return None;
    }

    // Format: "timestamp LEVEL target: message"
    let error_messages: Vec<String> = errors
        .iter()
        .filter_map(|line| line.split_once(": ").map(|(_, msg)| msg.to_string()))
        .collect();

    if error_messages.is_empty() {
        Some(errors.join("\n"))
    } else {
        Some(error_messages.join("\n"))
    }
}

/// Wrap an error with startup log info if available.
fn wrap_with_startup_error(err: ClientError, config: &DaemonConfig) -> ClientError {
    if matches!(err, ClientError::DaemonStartFailed(_)) {
        return err;
    }

    match read_startup_error(&config.log_path) {
        Some(startup_error) => ClientError::DaemonStartFailed(startup_error),
        None => err,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
