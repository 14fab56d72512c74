// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task run state machine
//!
//! A run is one execution attempt of a task:
//!
//! ```text
//! pending -> running -> succeeded | failed | timed_out | cancelled
//! pending -> cancelled
//! ```
//!
//! A failed or timed-out attempt asks for a retry through
//! [`RunEffect::Retry`] while attempts remain. The retry is a new run record
//! sharing the same `lineage`.

use crate::task::{TaskDefinition, TaskId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error detail recorded for runs cut short by a restart or shutdown
pub const INTERRUPTED: &str = "interrupted";

/// Monotonic per-task run number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    pub fn next(self) -> Self {
        RunId(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            "timed_out" => Ok(RunStatus::TimedOut),
            "cancelled" => Ok(RunStatus::Cancelled),
            _ => Err(format!("unknown run status: {}", s)),
        }
    }
}

/// Captured result of an action, bounded in size
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub truncated: bool,
}

impl RunOutput {
    /// Capture raw output, keeping at most `cap` bytes of text
    pub fn capture(raw: &[u8], exit_code: Option<i32>, cap: usize) -> Self {
        let mut text = String::from_utf8_lossy(raw).into_owned();
        let truncated = text.len() > cap;
        if truncated {
            let mut end = cap;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        Self {
            text,
            exit_code,
            truncated,
        }
    }
}

/// Events that drive a run's state
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Executor picked the run up
    Start,
    /// Action returned successfully
    Succeed { output: RunOutput },
    /// Action returned an error or nonzero exit
    Fail {
        output: Option<RunOutput>,
        error: String,
    },
    /// Deadline expired before the action returned
    TimeOut,
    /// Operator cancelled the run
    Cancel,
    /// Process stopped or restarted while the run was in flight
    Interrupt,
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEffect {
    /// Persist a pending follow-up attempt not to start before `not_before`
    Retry {
        attempt: u32,
        not_before: DateTime<Utc>,
    },
}

/// One execution attempt of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRun {
    pub task_id: TaskId,
    pub run_id: RunId,
    /// Run id of the first attempt in this retry chain
    pub lineage: RunId,
    /// 1-based attempt number within the chain
    pub attempt: u32,
    pub status: RunStatus,
    /// Earliest time the run may start
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<RunOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub version: Version,
}

impl TaskRun {
    /// First attempt of a new chain
    pub fn new(task_id: TaskId, run_id: RunId, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            run_id,
            lineage: run_id,
            attempt: 1,
            status: RunStatus::Pending,
            scheduled_at,
            started_at: None,
            ended_at: None,
            output: None,
            error: None,
            version: Version::INITIAL,
        }
    }

    /// Follow-up attempt in the same chain
    pub fn retry(&self, run_id: RunId, attempt: u32, not_before: DateTime<Utc>) -> Self {
        Self {
            lineage: self.lineage,
            attempt,
            ..Self::new(self.task_id.clone(), run_id, not_before)
        }
    }

    /// Pure transition function - returns the new run and requested effects
    ///
    /// Invalid transitions leave the run unchanged and request nothing.
    pub fn transition(
        &self,
        event: RunEvent,
        task: &TaskDefinition,
        now: DateTime<Utc>,
    ) -> (TaskRun, Vec<RunEffect>) {
        match (self.status, event) {
            (RunStatus::Pending, RunEvent::Start) => {
                let run = TaskRun {
                    status: RunStatus::Running,
                    started_at: Some(now),
                    ..self.clone()
                };
                (run, vec![])
            }

            (RunStatus::Running, RunEvent::Succeed { output }) => {
                let run = TaskRun {
                    status: RunStatus::Succeeded,
                    ended_at: Some(now),
                    output: Some(output),
                    ..self.clone()
                };
                (run, vec![])
            }

            (RunStatus::Running, RunEvent::Fail { output, error }) => {
                let run = TaskRun {
                    status: RunStatus::Failed,
                    ended_at: Some(now),
                    output,
                    error: Some(error),
                    ..self.clone()
                };
                let effects = self.retry_effects(task, now);
                (run, effects)
            }

            (RunStatus::Running, RunEvent::TimeOut) => {
                let run = TaskRun {
                    status: RunStatus::TimedOut,
                    ended_at: Some(now),
                    error: Some(format!("timed out after {:?}", task.timeout)),
                    ..self.clone()
                };
                let effects = self.retry_effects(task, now);
                (run, effects)
            }

            (RunStatus::Running, RunEvent::Interrupt) => {
                let run = TaskRun {
                    status: RunStatus::Failed,
                    ended_at: Some(now),
                    error: Some(INTERRUPTED.to_string()),
                    ..self.clone()
                };
                let effects = self.retry_effects(task, now);
                (run, effects)
            }

            (RunStatus::Pending | RunStatus::Running, RunEvent::Cancel) => {
                let run = TaskRun {
                    status: RunStatus::Cancelled,
                    ended_at: Some(now),
                    ..self.clone()
                };
                (run, vec![])
            }

            // Invalid transitions - no change
            _ => (self.clone(), vec![]),
        }
    }

    fn retry_effects(&self, task: &TaskDefinition, now: DateTime<Utc>) -> Vec<RunEffect> {
        if self.attempt > task.max_retries {
            return vec![];
        }
        let delay = task.retry_backoff.delay_for(self.attempt);
        let not_before = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        vec![RunEffect::Retry {
            attempt: self.attempt + 1,
            not_before,
        }]
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::TimedOut | RunStatus::Cancelled
        )
    }

    pub fn is_pending(&self) -> bool {
        self.status == RunStatus::Pending
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
