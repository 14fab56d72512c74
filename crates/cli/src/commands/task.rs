// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task commands

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cg_core::{RunId, TaskDefinition, TaskId, TaskPatch, TaskRun, TaskSpec, Trigger};
use cg_daemon::protocol::TaskStatus;
use clap::Subcommand;
use serde::Serialize;

use crate::client::DaemonClient;
use crate::output::{self, OutputFormat};

#[derive(clap::Args)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Create a task from a TOML definition file
    Create {
        /// Path to the task file
        file: PathBuf,
    },
    /// List all tasks
    List,
    /// Show a task and its latest run
    Show { id: String },
    /// List a task's run history, oldest first
    Runs { id: String },
    /// Run a task now, outside its schedule
    Run { id: String },
    /// Cancel a task's active run
    Cancel { id: String },
    /// Enable a task
    Enable { id: String },
    /// Disable a task, cancelling any queued run
    Disable { id: String },
    /// Delete a task and its history
    Delete { id: String },
}

/// Read a task definition file
pub fn load_spec(path: &Path) -> Result<TaskSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_spec(&text).with_context(|| format!("invalid task file {}", path.display()))
}

fn parse_spec(text: &str) -> Result<TaskSpec> {
    Ok(toml::from_str(text)?)
}

pub async fn handle(
    command: TaskCommand,
    client: &DaemonClient,
    format: OutputFormat,
) -> Result<()> {
    match command {
        TaskCommand::Create { file } => {
            let spec = load_spec(&file)?;
            let task = client.create_task(spec).await?;
            output::print(&TaskRow(task), format);
        }
        TaskCommand::List => {
            let tasks: Vec<TaskRow> = client
                .list_tasks()
                .await?
                .into_iter()
                .map(TaskRow)
                .collect();
            output::print_list(&tasks, "No tasks", format);
        }
        TaskCommand::Show { id } => {
            let status = client.get_status(&TaskId::new(id)).await?;
            output::print(&StatusView(status), format);
        }
        TaskCommand::Runs { id } => {
            let runs: Vec<RunRow> = client
                .list_runs(&TaskId::new(id))
                .await?
                .into_iter()
                .map(RunRow)
                .collect();
            output::print_list(&runs, "No runs", format);
        }
        TaskCommand::Run { id } => {
            let task_id = TaskId::new(id);
            let run_id = client.run_now(&task_id).await?;
            output::print(&RunAck::new("Requested", task_id, run_id), format);
        }
        TaskCommand::Cancel { id } => {
            let task_id = TaskId::new(id);
            let run_id = client.cancel_run(&task_id).await?;
            output::print(&RunAck::new("Cancelled", task_id, run_id), format);
        }
        TaskCommand::Enable { id } => set_enabled(client, TaskId::new(id), true, format).await?,
        TaskCommand::Disable { id } => set_enabled(client, TaskId::new(id), false, format).await?,
        TaskCommand::Delete { id } => {
            let task_id = TaskId::new(id);
            client.delete_task(&task_id).await?;
            output::print(&Deleted { task_id }, format);
        }
    }
    Ok(())
}

/// Toggle `enabled` against the version just read
async fn set_enabled(
    client: &DaemonClient,
    id: TaskId,
    enabled: bool,
    format: OutputFormat,
) -> Result<()> {
    let current = client.get_status(&id).await?.definition;
    let task = client
        .update_task(&id, TaskPatch::enabled(enabled), current.version)
        .await?;
    output::print(&TaskRow(task), format);
    Ok(())
}

pub(crate) fn describe_trigger(trigger: &Trigger) -> String {
    match trigger {
        Trigger::OneShot { at } => format!("once at {}", at.to_rfc3339()),
        Trigger::Interval { every, .. } => format!("every {}s", every.as_secs()),
        Trigger::Cron { expression } => format!("cron {}", expression),
    }
}

#[derive(Serialize)]
#[serde(transparent)]
struct TaskRow(TaskDefinition);

impl fmt::Display for TaskRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task = &self.0;
        let next = task
            .next_fire_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{:<36} {:<20} {:<8} {:<24} next={}",
            task.id,
            task.name,
            if task.enabled { "enabled" } else { "disabled" },
            describe_trigger(&task.trigger),
            next
        )
    }
}

#[derive(Serialize)]
#[serde(transparent)]
struct RunRow(TaskRun);

impl fmt::Display for RunRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = &self.0;
        let started = run
            .started_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "#{:<5} attempt {:<3} {:<10} started={}",
            run.run_id, run.attempt, run.status, started
        )?;
        if let Some(error) = &run.error {
            write!(f, " error={}", error)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(transparent)]
struct StatusView(TaskStatus);

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task = &self.0.definition;
        writeln!(f, "Task: {}", task.id)?;
        writeln!(f, "  Name: {}", task.name)?;
        writeln!(f, "  Enabled: {}", task.enabled)?;
        writeln!(f, "  Trigger: {}", describe_trigger(&task.trigger))?;
        writeln!(f, "  Action: {}", task.action.kind)?;
        writeln!(f, "  Retries: {}", task.max_retries)?;
        writeln!(f, "  Timeout: {}s", task.timeout.as_secs())?;
        writeln!(f, "  Version: {}", task.version)?;
        if let Some(next) = task.next_fire_at {
            writeln!(f, "  Next fire: {}", next.to_rfc3339())?;
        }
        match &self.0.latest_run {
            Some(run) => {
                write!(f, "  Latest run: #{} {}", run.run_id, run.status)?;
                if let Some(error) = &run.error {
                    write!(f, " ({})", error)?;
                }
                if let Some(output) = &run.output {
                    write!(f, "\n  Output:\n{}", output.text.trim_end())?;
                    if output.truncated {
                        write!(f, "\n  [truncated]")?;
                    }
                }
                Ok(())
            }
            None => write!(f, "  Latest run: -"),
        }
    }
}

#[derive(Serialize)]
struct RunAck {
    #[serde(skip)]
    verb: &'static str,
    task_id: TaskId,
    run_id: RunId,
}

impl RunAck {
    fn new(verb: &'static str, task_id: TaskId, run_id: RunId) -> Self {
        Self {
            verb,
            task_id,
            run_id,
        }
    }
}

impl fmt::Display for RunAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} run {} of task {}", self.verb, self.run_id, self.task_id)
    }
}

#[derive(Serialize)]
struct Deleted {
    task_id: TaskId,
}

impl fmt::Display for Deleted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deleted task {}", self.task_id)
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
