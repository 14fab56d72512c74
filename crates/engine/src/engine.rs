// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine handle and the operations exposed to callers
//!
//! All launch decisions (scheduler ticks, manual runs, cancellation and
//! edits) are made under a single lock, so the concurrency ceiling and the
//! one-active-run-per-task rule are checked and claimed atomically. Action
//! invocations run outside that lock on spawned tasks.

use crate::error::EngineError;
use crate::recovery::{self, RecoveryReport};
use cg_adapters::ActionResolver;
use cg_core::{
    Clock, EngineConfig, IdGen, RunEvent, RunId, TaskDefinition, TaskId, TaskPatch, TaskRun,
    TaskSpec, Version,
};
use cg_storage::TaskRepository;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// A task definition together with its most recent run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub definition: TaskDefinition,
    pub latest_run: Option<TaskRun>,
}

/// Engine-wide counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub tasks: usize,
    pub running: usize,
    pub max_tasks: usize,
}

/// Why an in-flight run was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    /// Operator cancel or task deletion
    Cancelled,
    /// Engine shutting down
    Shutdown,
}

pub(crate) struct InFlight {
    pub(crate) run_id: RunId,
    pub(crate) cancel: CancellationToken,
    /// Cancelled by the executor once the outcome is persisted
    pub(crate) done: CancellationToken,
    pub(crate) reason: Option<StopReason>,
}

pub(crate) struct Shared<C: Clock> {
    pub(crate) repo: TaskRepository,
    pub(crate) resolver: ActionResolver,
    pub(crate) config: EngineConfig,
    pub(crate) clock: C,
    pub(crate) inflight: Mutex<HashMap<TaskId, InFlight>>,
    launch: Mutex<()>,
}

impl<C: Clock> Shared<C> {
    pub(crate) fn lock_launch(&self) -> MutexGuard<'_, ()> {
        self.launch.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn lock_inflight(&self) -> MutexGuard<'_, HashMap<TaskId, InFlight>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn free_slots(&self) -> usize {
        self.config
            .max_tasks
            .saturating_sub(self.lock_inflight().len())
    }

    pub(crate) fn is_in_flight(&self, id: &TaskId) -> bool {
        self.lock_inflight().contains_key(id)
    }

    /// Signal an in-flight run to stop, returning its completion token
    fn stop(&self, id: &TaskId, reason: StopReason) -> Option<(RunId, CancellationToken)> {
        let mut inflight = self.lock_inflight();
        let entry = inflight.get_mut(id)?;
        entry.reason.get_or_insert(reason);
        entry.cancel.cancel();
        Some((entry.run_id, entry.done.clone()))
    }

    /// Cancel the task's pending run, if it has one
    fn cancel_pending(&self, task: &TaskDefinition) -> Result<Option<RunId>, EngineError> {
        let Some(run) = self.repo.active_run(&task.id)? else {
            return Ok(None);
        };
        if !run.is_pending() {
            return Ok(None);
        }
        let (cancelled, _) = run.transition(RunEvent::Cancel, task, self.clock.now());
        let cancelled = self.repo.update_run(cancelled)?;
        tracing::info!(task_id = %task.id, run_id = %cancelled.run_id, "pending run cancelled");
        Ok(Some(cancelled.run_id))
    }
}

/// Handle to a running engine
///
/// Cheap to clone; clones share the same repository and in-flight runs.
#[derive(Clone)]
pub struct Engine<C: Clock, I: IdGen> {
    pub(crate) shared: Arc<Shared<C>>,
    id_gen: I,
}

impl<C: Clock, I: IdGen> Engine<C, I> {
    /// Open the repository under `config.data_dir` and reconcile runs left
    /// over from a previous process
    pub fn open(
        config: EngineConfig,
        resolver: ActionResolver,
        clock: C,
        id_gen: I,
    ) -> Result<(Self, RecoveryReport), EngineError> {
        let repo = TaskRepository::open(&config.data_dir, config.run_retention)?;
        let report = recovery::reconcile(&repo, clock.now())?;
        if report.interrupted > 0 {
            tracing::warn!(
                interrupted = report.interrupted,
                retried = report.retried,
                "recovered runs interrupted by previous shutdown"
            );
        }

        let shared = Arc::new(Shared {
            repo,
            resolver,
            config,
            clock,
            inflight: Mutex::new(HashMap::new()),
            launch: Mutex::new(()),
        });
        Ok((Self { shared, id_gen }, report))
    }

    pub fn create_task(&self, spec: TaskSpec) -> Result<TaskDefinition, EngineError> {
        let id = self.id_gen.next_task_id();
        let task = TaskDefinition::new(id, spec, &self.shared.config, self.shared.clock.now())?;
        self.check_kind(&task)?;
        let task = self.shared.repo.create_task(task)?;
        tracing::info!(
            task_id = %task.id,
            name = %task.name,
            next_fire_at = ?task.next_fire_at,
            "task created"
        );
        Ok(task)
    }

    /// Apply `patch` if the stored version still equals `expected`
    ///
    /// Disabling a task cancels its pending run; a run already in flight
    /// finishes normally.
    pub fn update_task(
        &self,
        id: &TaskId,
        patch: TaskPatch,
        expected: Version,
    ) -> Result<TaskDefinition, EngineError> {
        let shared = &self.shared;
        let _launch = shared.lock_launch();

        let current = shared.repo.get_task(id)?;
        if current.version != expected {
            return Err(EngineError::Conflict(format!(
                "task {} is at version {}, not {}",
                id, current.version, expected
            )));
        }
        let updated = current.patched(patch, shared.clock.now())?;
        self.check_kind(&updated)?;
        let updated = shared.repo.update_task(updated)?;
        if !updated.enabled {
            shared.cancel_pending(&updated)?;
        }
        tracing::info!(task_id = %id, version = %updated.version, "task updated");
        Ok(updated)
    }

    /// Delete a task and its run history, cancelling any active run first
    pub async fn delete_task(&self, id: &TaskId) -> Result<(), EngineError> {
        let shared = &self.shared;
        let stopping = {
            let _launch = shared.lock_launch();
            let task = shared.repo.get_task(id)?;
            // Keep the scheduler away while the in-flight run winds down
            let task = if task.enabled {
                shared
                    .repo
                    .update_task(task.patched(TaskPatch::enabled(false), shared.clock.now())?)?
            } else {
                task
            };
            shared.cancel_pending(&task)?;
            shared.stop(id, StopReason::Cancelled)
        };
        if let Some((_, done)) = stopping {
            done.cancelled().await;
        }

        let _launch = shared.lock_launch();
        shared.repo.delete_task(id)?;
        tracing::info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Start a run now, ignoring the trigger
    ///
    /// When the concurrency ceiling is reached the run is recorded as
    /// pending and starts on a later tick.
    pub fn run_now(&self, id: &TaskId) -> Result<RunId, EngineError> {
        let shared = &self.shared;
        let _launch = shared.lock_launch();

        let task = shared.repo.get_task(id)?;
        if shared.is_in_flight(id) || shared.repo.active_run(id)?.is_some() {
            return Err(EngineError::Busy(id.clone()));
        }
        let now = shared.clock.now();
        let run_id = shared.repo.next_run_id(id);
        let run = shared.repo.insert_run(TaskRun::new(id.clone(), run_id, now))?;
        if shared.free_slots() > 0 {
            shared.launch(task, run)?;
        } else {
            tracing::info!(task_id = %id, run_id = %run_id, "at capacity, run queued");
        }
        Ok(run_id)
    }

    /// Cancel the task's active run
    ///
    /// For an in-flight run this waits until the cancellation is recorded.
    pub async fn cancel_run(&self, id: &TaskId) -> Result<RunId, EngineError> {
        let shared = &self.shared;
        let stopping = {
            let _launch = shared.lock_launch();
            let task = shared.repo.get_task(id)?;
            match shared.stop(id, StopReason::Cancelled) {
                Some(stopping) => stopping,
                None => {
                    return shared
                        .cancel_pending(&task)?
                        .ok_or_else(|| EngineError::NotRunning(id.clone()));
                }
            }
        };
        let (run_id, done) = stopping;
        done.cancelled().await;
        Ok(run_id)
    }

    pub fn get_status(&self, id: &TaskId) -> Result<TaskStatus, EngineError> {
        let definition = self.shared.repo.get_task(id)?;
        let latest_run = self.shared.repo.latest_run(id)?;
        Ok(TaskStatus {
            definition,
            latest_run,
        })
    }

    pub fn list_tasks(&self) -> Result<Vec<TaskDefinition>, EngineError> {
        Ok(self.shared.repo.list_tasks()?)
    }

    /// Runs of a task, oldest first
    pub fn list_runs(&self, id: &TaskId) -> Result<Vec<TaskRun>, EngineError> {
        self.shared.repo.get_task(id)?;
        Ok(self.shared.repo.list_runs(id)?)
    }

    pub fn status(&self) -> Result<EngineStatus, EngineError> {
        Ok(EngineStatus {
            tasks: self.shared.repo.list_tasks()?.len(),
            running: self.shared.lock_inflight().len(),
            max_tasks: self.shared.config.max_tasks,
        })
    }

    /// Run one scheduling pass, returning how many runs were started
    pub fn tick(&self) -> Result<usize, EngineError> {
        self.shared.tick()
    }

    /// Tick every `tick_interval` until `shutdown` fires, then stop all
    /// in-flight runs
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.shared.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            max_tasks = self.shared.config.max_tasks,
            tick_interval = ?self.shared.config.tick_interval,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        tracing::error!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }

        self.shutdown().await;
        tracing::info!("scheduler stopped");
    }

    /// Interrupt every in-flight run and wait for them to be recorded
    pub async fn shutdown(&self) {
        let stopping: Vec<_> = {
            let mut inflight = self.shared.lock_inflight();
            inflight
                .values_mut()
                .map(|entry| {
                    entry.reason.get_or_insert(StopReason::Shutdown);
                    entry.cancel.cancel();
                    entry.done.clone()
                })
                .collect()
        };
        if !stopping.is_empty() {
            tracing::info!(count = stopping.len(), "interrupting in-flight runs");
        }
        for done in stopping {
            done.cancelled().await;
        }
    }

    /// Wait until no run is in flight
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<_> = self
                .shared
                .lock_inflight()
                .values()
                .map(|entry| entry.done.clone())
                .collect();
            if pending.is_empty() {
                return;
            }
            for done in pending {
                done.cancelled().await;
            }
        }
    }

    fn check_kind(&self, task: &TaskDefinition) -> Result<(), EngineError> {
        if self.shared.resolver.contains(&task.action.kind) {
            Ok(())
        } else {
            Err(EngineError::InvalidTask(format!(
                "unknown action kind: {}",
                task.action.kind
            )))
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
