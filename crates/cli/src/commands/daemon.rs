// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon management commands

use std::fmt;
use std::path::Path;

use anyhow::Result;
use cg_daemon::DaemonConfig;
use clap::Subcommand;
use serde::Serialize;

use crate::client::{self, ClientError, DaemonClient};
use crate::output::{self, OutputFormat};

#[derive(clap::Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommand,
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon in the background if it is not running
    Start,
    /// Show whether the daemon is running and how busy it is
    Status,
    /// Stop the daemon, interrupting in-flight runs
    Stop,
}

#[derive(Serialize)]
struct DaemonReport {
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uptime_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tasks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_runs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tasks: Option<usize>,
}

impl DaemonReport {
    fn not_running() -> Self {
        Self {
            running: false,
            version: None,
            uptime_secs: None,
            tasks: None,
            active_runs: None,
            max_tasks: None,
        }
    }
}

impl fmt::Display for DaemonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.running {
            return write!(f, "Daemon not running");
        }
        writeln!(
            f,
            "Daemon running (version {})",
            self.version.as_deref().unwrap_or("unknown")
        )?;
        writeln!(f, "  Uptime: {}s", self.uptime_secs.unwrap_or(0))?;
        writeln!(f, "  Tasks: {}", self.tasks.unwrap_or(0))?;
        write!(
            f,
            "  Active runs: {}/{}",
            self.active_runs.unwrap_or(0),
            self.max_tasks.unwrap_or(0)
        )
    }
}

pub async fn handle(
    command: DaemonCommand,
    config: &DaemonConfig,
    config_file: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    match command {
        DaemonCommand::Start => {
            let client = DaemonClient::connect_or_start(config, config_file)?;
            let version = client.hello().await?;
            if format == OutputFormat::Text {
                println!("Daemon running (version {})", version);
            }
        }
        DaemonCommand::Status => {
            let report = match DaemonClient::connect(config) {
                Ok(client) => {
                    let version = client.hello().await?;
                    let status = client.status().await?;
                    DaemonReport {
                        running: true,
                        version: Some(version),
                        uptime_secs: Some(status.uptime_secs),
                        tasks: Some(status.tasks),
                        active_runs: Some(status.running),
                        max_tasks: Some(status.max_tasks),
                    }
                }
                Err(ClientError::DaemonNotRunning) => DaemonReport::not_running(),
                Err(e) => return Err(e.into()),
            };
            output::print(&report, format);
        }
        DaemonCommand::Stop => {
            let stopped = client::daemon_stop(config).await?;
            if format == OutputFormat::Text {
                if stopped {
                    println!("Daemon stopped");
                } else {
                    println!("Daemon not running");
                }
            }
        }
    }
    Ok(())
}
