// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution plan action
//!
//! Parameters: `plan` (required). Every other parameter is passed to each
//! step, below the step's own `params`. A step runs once per host, hosts
//! concurrently, with the host bound to `host` so `<hostname>` resolves.
//!
//! The plan fails when a step reports an error on any host, unless that
//! step declares `on_error_jump_to`. Its output is a per-step, per-host
//! report.

use super::{Action, ActionError, ActionOutcome, Params};
use crate::resolver::ActionResolver;
use async_trait::async_trait;
use cg_core::{position_of, HostResult, PlanBook, PlanItem, PlanStep, StepResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Step executions allowed per invocation, so jump loops terminate
pub const MAX_STEP_EXECUTIONS: usize = 256;

const PLAN_KEY: &str = "plan";
const HOST_KEY: &str = "host";

#[derive(Clone)]
pub struct PlanAction {
    book: Arc<PlanBook>,
    steps: ActionResolver,
}

impl PlanAction {
    pub const KIND: &'static str = "plan";

    /// Plans from `book` whose steps resolve against `steps`
    pub fn new(book: PlanBook, steps: ActionResolver) -> Self {
        Self {
            book: Arc::new(book),
            steps,
        }
    }
}

#[async_trait]
impl Action for PlanAction {
    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn invoke(
        &self,
        params: &Params,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        let name = params.require(PLAN_KEY)?;
        if !self.book.contains(&name) {
            return Err(ActionError::InvalidParams(format!("unknown plan '{}'", name)));
        }

        let mut shared = params.values().clone();
        shared.remove(PLAN_KEY);
        let mut run = PlanRun {
            action: self,
            shared,
            deadline,
            cancel,
            executed: 0,
            report: String::new(),
            failures: Vec::new(),
        };
        run.run_plan(&name).await?;

        let PlanRun {
            report, failures, ..
        } = run;
        if failures.is_empty() {
            Ok(ActionOutcome::ok(report))
        } else {
            Ok(ActionOutcome::error(report, failures.join("; ")))
        }
    }
}

type PlanFuture<'a> = Pin<Box<dyn Future<Output = Result<bool, ActionError>> + Send + 'a>>;

/// State of one plan invocation, shared by nested plans
struct PlanRun<'a> {
    action: &'a PlanAction,
    shared: BTreeMap<String, Value>,
    deadline: Duration,
    cancel: CancellationToken,
    executed: usize,
    report: String,
    failures: Vec<String>,
}

impl PlanRun<'_> {
    /// Run `name` to its end; true when no step failed unhandled
    fn run_plan<'s>(&'s mut self, name: &'s str) -> PlanFuture<'s> {
        Box::pin(async move {
            let book = Arc::clone(&self.action.book);
            let plan = book
                .get(name)
                .map_err(|e| ActionError::InvalidParams(e.to_string()))?;
            let sequence = plan.sequence();
            let mut results: BTreeMap<usize, StepResult> = BTreeMap::new();
            let mut clean = true;
            let mut cursor = 0;

            while let Some(item) = sequence.get(cursor) {
                if self.cancel.is_cancelled() {
                    return Err(ActionError::Cancelled);
                }
                let (index, step) = match *item {
                    PlanItem::Plan(nested) => {
                        clean &= self.run_plan(nested).await?;
                        cursor += 1;
                        continue;
                    }
                    PlanItem::Step { index, step } => (index, step),
                };

                if !step.conditions_met(index, &results) {
                    tracing::debug!(plan = name, step = index, "conditions not met, skipping");
                    let _ = writeln!(self.report, "[{}#{}] {}: skipped", name, index, step.command);
                    cursor += 1;
                    continue;
                }

                self.executed += 1;
                if self.executed > MAX_STEP_EXECUTIONS {
                    return Err(ActionError::InvalidParams(format!(
                        "plan '{}' exceeded {} step executions",
                        name, MAX_STEP_EXECUTIONS
                    )));
                }

                let result = self.run_step(name, index, step).await?;
                if result.errors() > 0 && step.on_error_jump_to.is_none() {
                    clean = false;
                    for failed in result.hosts.iter().filter(|h| !h.ok) {
                        self.failures.push(format!(
                            "{}#{} on {}: {}",
                            name,
                            index,
                            host_label(&failed.host),
                            failed.error.as_deref().unwrap_or("failed")
                        ));
                    }
                }

                cursor = match step.jump_target(&result) {
                    Some(target) => {
                        tracing::info!(plan = name, step = index, to = target, "jumping");
                        position_of(&sequence, target)
                    }
                    None => cursor + 1,
                };
                results.insert(index, result);
            }
            Ok(clean)
        })
    }

    async fn run_step(
        &mut self,
        plan: &str,
        index: usize,
        step: &PlanStep,
    ) -> Result<StepResult, ActionError> {
        tracing::info!(
            plan,
            step = index,
            command = %step.command,
            hosts = step.hostnames.len(),
            "running plan step"
        );

        if self.action.book.contains(&step.command) {
            let recorded = self.failures.len();
            let ok = self.run_plan(&step.command).await?;
            if step.on_error_jump_to.is_some() {
                self.failures.truncate(recorded);
            }
            let _ = writeln!(
                self.report,
                "[{}#{}] {}: {}",
                plan,
                index,
                step.command,
                if ok { "ok" } else { "error" }
            );
            return Ok(StepResult {
                hosts: vec![HostResult {
                    host: None,
                    ok,
                    output: String::new(),
                    error: (!ok).then(|| format!("plan '{}' failed", step.command)),
                }],
            });
        }

        let action = self.action.steps.resolve(&step.command)?;
        let mut values = self.shared.clone();
        values.extend(step.params.clone());
        let hosts: Vec<Option<String>> = if step.hostnames.is_empty() {
            vec![None]
        } else {
            step.hostnames.iter().cloned().map(Some).collect()
        };

        let mut tasks = JoinSet::new();
        for (slot, host) in hosts.into_iter().enumerate() {
            let mut values = values.clone();
            if let Some(host) = &host {
                values.insert(HOST_KEY.to_string(), Value::String(host.clone()));
            }
            let action = Arc::clone(&action);
            let cancel = self.cancel.clone();
            let deadline = self.deadline;
            tasks.spawn(async move {
                let outcome = action.invoke(&Params::new(values), deadline, cancel).await;
                (slot, host, outcome)
            });
        }

        let mut slots: Vec<Option<HostResult>> = Vec::new();
        slots.resize_with(step.hostnames.len().max(1), || None);
        while let Some(joined) = tasks.join_next().await {
            let (slot, host, outcome) = joined
                .map_err(|e| ActionError::Transport(format!("step task failed: {}", e)))?;
            let result = match outcome {
                Ok(outcome) => HostResult {
                    host,
                    ok: outcome.is_ok(),
                    output: String::from_utf8_lossy(&outcome.output).into_owned(),
                    error: outcome.detail,
                },
                Err(ActionError::Cancelled) => return Err(ActionError::Cancelled),
                Err(e) => HostResult {
                    host,
                    ok: false,
                    output: String::new(),
                    error: Some(e.to_string()),
                },
            };
            if let Some(entry) = slots.get_mut(slot) {
                *entry = Some(result);
            }
        }

        let result = StepResult {
            hosts: slots.into_iter().flatten().collect(),
        };
        for entry in &result.hosts {
            let status = if entry.ok { "ok" } else { "error" };
            let _ = writeln!(
                self.report,
                "[{}#{}] {} @{}: {}",
                plan,
                index,
                step.command,
                host_label(&entry.host),
                status
            );
            let output = entry.output.trim_end();
            if !output.is_empty() {
                let _ = writeln!(self.report, "{}", output);
            }
            if let Some(error) = entry.error.as_deref().filter(|_| !entry.ok) {
                let _ = writeln!(self.report, "{}", error);
            }
        }
        Ok(result)
    }
}

fn host_label(host: &Option<String>) -> &str {
    host.as_deref().unwrap_or("local")
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
