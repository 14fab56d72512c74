// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduling pass: pick runnable work and start it within the ceiling

use crate::engine::{InFlight, Shared};
use crate::error::EngineError;
use cg_core::{Clock, RunEvent, RunId, TaskDefinition, TaskRun};
use cg_storage::RepoError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Re-reads allowed when a definition changes underneath a fire
const FIRE_ATTEMPTS: usize = 3;

impl<C: Clock> Shared<C> {
    /// Start runnable work, oldest obligations first
    ///
    /// Pending runs (retries and queued manual runs) go before newly due
    /// tasks. A task with an active run is skipped and stays due, so missed
    /// occurrences coalesce into a single fire once it is free.
    pub(crate) fn tick(self: &Arc<Self>) -> Result<usize, EngineError> {
        let _launch = self.lock_launch();
        let now = self.clock.now();
        let mut launched = 0;

        for run in self.repo.pending_due(now)? {
            if self.free_slots() == 0 {
                return Ok(launched);
            }
            if self.is_in_flight(&run.task_id) {
                continue;
            }
            let task = match self.repo.get_task(&run.task_id) {
                Ok(task) => task,
                Err(RepoError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            self.launch(task, run)?;
            launched += 1;
        }

        for task in self.repo.list_due(now)? {
            if self.free_slots() == 0 {
                break;
            }
            if self.is_in_flight(&task.id) || self.repo.active_run(&task.id)?.is_some() {
                tracing::debug!(task_id = %task.id, "due but still active, deferred");
                continue;
            }
            let run_id = self.repo.next_run_id(&task.id);
            let run = self
                .repo
                .insert_run(TaskRun::new(task.id.clone(), run_id, now))?;
            let task = self.fire(task, now)?;
            self.launch(task, run)?;
            launched += 1;
        }

        if launched > 0 {
            tracing::debug!(launched, "tick");
        }
        Ok(launched)
    }

    /// Advance a definition past the occurrence being fired at `now`
    fn fire(&self, task: TaskDefinition, now: DateTime<Utc>) -> Result<TaskDefinition, EngineError> {
        let id = task.id.clone();
        let mut current = task;
        for _ in 0..FIRE_ATTEMPTS {
            match self.repo.update_task(current.fired(now)) {
                Ok(stored) => return Ok(stored),
                Err(RepoError::Conflict { .. }) => current = self.repo.get_task(&id)?,
                Err(e) => return Err(e.into()),
            }
        }
        Err(EngineError::Conflict(format!(
            "task {} kept changing while firing",
            id
        )))
    }

    /// Mark `run` running and hand it to an executor
    ///
    /// Callers hold the launch lock and have checked for a free slot.
    pub(crate) fn launch(
        self: &Arc<Self>,
        task: TaskDefinition,
        run: TaskRun,
    ) -> Result<RunId, EngineError> {
        let (started, _) = run.transition(RunEvent::Start, &task, self.clock.now());
        let started = self.repo.update_run(started)?;
        let run_id = started.run_id;

        let cancel = CancellationToken::new();
        let done = CancellationToken::new();
        self.lock_inflight().insert(
            task.id.clone(),
            InFlight {
                run_id,
                cancel: cancel.clone(),
                done: done.clone(),
                reason: None,
            },
        );
        tracing::info!(
            task_id = %task.id,
            run_id = %run_id,
            attempt = started.attempt,
            kind = %task.action.kind,
            "run started"
        );

        let shared = Arc::clone(self);
        tokio::spawn(async move { shared.execute(task, started, cancel, done).await });
        Ok(run_id)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
