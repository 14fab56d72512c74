// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation of runs left running by a previous process

use crate::error::EngineError;
use cg_core::{RunEffect, RunEvent};
use cg_storage::{RepoError, TaskRepository};
use chrono::{DateTime, Utc};

/// What reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Runs found `running` and marked failed
    pub interrupted: usize,
    /// Retries queued for them
    pub retried: usize,
}

/// Mark every `running` run as failed with an interrupted error and queue a
/// retry where the task's policy allows one
///
/// Pending runs are left alone; the scheduler picks them up normally.
pub(crate) fn reconcile(
    repo: &TaskRepository,
    now: DateTime<Utc>,
) -> Result<RecoveryReport, EngineError> {
    let mut report = RecoveryReport::default();

    for run in repo.list_all_runs()? {
        if !run.is_running() {
            continue;
        }
        let task = match repo.get_task(&run.task_id) {
            Ok(task) => task,
            Err(RepoError::NotFound(_)) => {
                tracing::warn!(task_id = %run.task_id, run_id = %run.run_id, "run without task");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let (failed, effects) = run.transition(RunEvent::Interrupt, &task, now);
        let failed = repo.update_run(failed)?;
        report.interrupted += 1;
        tracing::info!(task_id = %task.id, run_id = %failed.run_id, "marked interrupted");

        for effect in effects {
            let RunEffect::Retry {
                attempt,
                not_before,
            } = effect;
            let run_id = repo.next_run_id(&task.id);
            repo.insert_run(failed.retry(run_id, attempt, not_before))?;
            report.retried += 1;
        }
    }

    Ok(report)
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
