// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run executor
//!
//! Invokes the action for one running run under its timeout, records the
//! outcome and schedules a retry when the run asks for one.

use crate::engine::{Shared, StopReason};
use crate::error::EngineError;
use cg_adapters::{ActionError, Params};
use cg_core::{Clock, RunEffect, RunEvent, RunOutput, TaskDefinition, TaskId, TaskRun};
use cg_storage::RepoError;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Frees the run's slot once the executor is gone, even on panic
struct Finished<C: Clock> {
    shared: Arc<Shared<C>>,
    task_id: TaskId,
    done: CancellationToken,
}

impl<C: Clock> Drop for Finished<C> {
    fn drop(&mut self) {
        self.shared.lock_inflight().remove(&self.task_id);
        self.done.cancel();
    }
}

impl<C: Clock> Shared<C> {
    pub(crate) async fn execute(
        self: Arc<Self>,
        task: TaskDefinition,
        run: TaskRun,
        cancel: CancellationToken,
        done: CancellationToken,
    ) {
        let span = tracing::info_span!(
            "run",
            task_id = %task.id,
            run_id = %run.run_id,
            attempt = run.attempt
        );
        async move {
            let _finished = Finished {
                shared: Arc::clone(&self),
                task_id: task.id.clone(),
                done,
            };
            let start = Instant::now();
            let event = self.invoke(&task, &cancel).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if let Err(e) = self.finish(&task, run, event, elapsed_ms) {
                tracing::error!(error = %e, "failed to record run outcome");
            }
        }
        .instrument(span)
        .await
    }

    async fn invoke(&self, task: &TaskDefinition, cancel: &CancellationToken) -> RunEvent {
        let action = match self.resolver.resolve(&task.action.kind) {
            Ok(action) => action,
            Err(e) => {
                return RunEvent::Fail {
                    output: None,
                    error: e.to_string(),
                }
            }
        };
        let params = Params::new(task.action.params.clone());
        let invocation = tokio::time::timeout(
            task.timeout,
            action.invoke(&params, task.timeout, cancel.clone()),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => self.stop_event(&task.id),
            result = invocation => match result {
                Err(_) => RunEvent::TimeOut,
                Ok(Ok(outcome)) => {
                    let output = RunOutput::capture(
                        &outcome.output,
                        outcome.exit_code,
                        self.config.output_cap,
                    );
                    if outcome.is_ok() {
                        RunEvent::Succeed { output }
                    } else {
                        RunEvent::Fail {
                            output: Some(output),
                            error: outcome
                                .detail
                                .unwrap_or_else(|| "action reported failure".to_string()),
                        }
                    }
                }
                Ok(Err(ActionError::Cancelled)) if cancel.is_cancelled() => {
                    self.stop_event(&task.id)
                }
                Ok(Err(e)) => RunEvent::Fail {
                    output: None,
                    error: e.to_string(),
                },
            },
        }
    }

    fn stop_event(&self, id: &TaskId) -> RunEvent {
        let reason = self.lock_inflight().get(id).and_then(|entry| entry.reason);
        match reason {
            Some(StopReason::Shutdown) => RunEvent::Interrupt,
            Some(StopReason::Cancelled) | None => RunEvent::Cancel,
        }
    }

    fn finish(
        &self,
        task: &TaskDefinition,
        run: TaskRun,
        event: RunEvent,
        elapsed_ms: u64,
    ) -> Result<(), EngineError> {
        // Outcome and retry are recorded atomically with respect to edits and ticks
        let _launch = self.lock_launch();
        let (ended, effects) = run.transition(event, task, self.clock.now());
        let ended = match self.repo.update_run(ended) {
            Ok(ended) => ended,
            Err(RepoError::NotFound(_)) => {
                tracing::debug!("task deleted while running, outcome dropped");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match ended.error.as_deref() {
            None => tracing::info!(status = %ended.status, elapsed_ms, "run finished"),
            Some(error) => {
                tracing::warn!(status = %ended.status, elapsed_ms, error, "run finished")
            }
        }

        for effect in effects {
            match effect {
                RunEffect::Retry {
                    attempt,
                    not_before,
                } => {
                    if !self.retry_allowed(task, &ended)? {
                        tracing::info!("task disabled or removed, retry dropped");
                        continue;
                    }
                    let run_id = self.repo.next_run_id(&task.id);
                    self.repo
                        .insert_run(ended.retry(run_id, attempt, not_before))?;
                    tracing::info!(
                        retry_run_id = %run_id,
                        attempt,
                        not_before = %not_before,
                        "retry scheduled"
                    );
                }
            }
        }
        Ok(())
    }

    /// A retry survives unless the task was disabled after the run started
    ///
    /// One-shot tasks disable themselves when fired, before the run starts,
    /// so their retries still go ahead.
    fn retry_allowed(&self, task: &TaskDefinition, ended: &TaskRun) -> Result<bool, EngineError> {
        let current = match self.repo.get_task(&task.id) {
            Ok(current) => current,
            Err(RepoError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let started = ended.started_at.unwrap_or(ended.scheduled_at);
        Ok(current.enabled || current.updated_at < started)
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
