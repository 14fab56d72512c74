// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution plans
//!
//! A plan is an ordered list of steps. Each step invokes an action kind, or
//! another plan, once per listed host. A step may be gated on the result of
//! an earlier step and may jump to another step once it finishes.
//!
//! Referenced plans run before the plan's own steps. When any step carries
//! `execute_at_position`, every item is ordered by position instead, with
//! referenced plans at position 0 and unpositioned steps at their index
//! offset by the number of referenced plans.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan '{0}' not found")]
    NotFound(String),
    #[error("plan '{plan}' references unknown plan '{reference}'")]
    UnknownReference { plan: String, reference: String },
    #[error("plan '{plan}' step {step}: unknown command '{command}'")]
    UnknownCommand {
        plan: String,
        step: usize,
        command: String,
    },
    #[error("plan '{plan}' step {step}: {reason}")]
    InvalidStep {
        plan: String,
        step: usize,
        reason: String,
    },
    #[error("plan '{0}' includes itself")]
    Cycle(String),
}

/// Gate on the per-host outcome of an earlier step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCondition {
    AllSuccess,
    AnySuccess,
    AllError,
    AnyError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanStep {
    /// Action kind or plan name
    pub command: String,
    /// Hosts to fan out over; empty runs the step once without a host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hostnames: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at_position: Option<usize>,
    /// Index of the earlier step the conditions below look at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_previous_command: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_previous_command_result: Option<ResultCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_previous_output_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success_jump_to: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error_jump_to: Option<usize>,
}

impl PlanStep {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn on_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hostnames = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Whether the gate on an earlier step holds
    ///
    /// A step without `if_previous_command` always runs. A gate on a step
    /// that has not run (skipped, or not reached) fails.
    pub fn conditions_met(&self, index: usize, results: &BTreeMap<usize, StepResult>) -> bool {
        let Some(previous) = self.if_previous_command else {
            return true;
        };
        if previous >= index {
            return false;
        }
        let Some(result) = results.get(&previous) else {
            return false;
        };
        if let Some(condition) = self.if_previous_command_result {
            if !result.satisfies(condition) {
                return false;
            }
        }
        match &self.if_previous_output_contains {
            Some(needle) if !needle.is_empty() => result.output_contains(needle),
            _ => true,
        }
    }

    /// Step index to continue at, if this step jumps after `result`
    ///
    /// The error jump applies only when every host failed; the success jump
    /// applies when at least one host succeeded.
    pub fn jump_target(&self, result: &StepResult) -> Option<usize> {
        if result.successes() == 0 && result.errors() > 0 {
            return self.on_error_jump_to;
        }
        if result.successes() > 0 {
            return self.on_success_jump_to;
        }
        None
    }
}

/// Outcome of a step on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResult {
    pub host: Option<String>,
    pub ok: bool,
    pub output: String,
    pub error: Option<String>,
}

/// Outcomes of a step across its hosts, in host order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepResult {
    pub hosts: Vec<HostResult>,
}

impl StepResult {
    pub fn successes(&self) -> usize {
        self.hosts.iter().filter(|h| h.ok).count()
    }

    pub fn errors(&self) -> usize {
        self.hosts.iter().filter(|h| !h.ok).count()
    }

    pub fn satisfies(&self, condition: ResultCondition) -> bool {
        match condition {
            ResultCondition::AllSuccess => self.errors() == 0,
            ResultCondition::AnySuccess => self.successes() > 0,
            ResultCondition::AllError => self.successes() == 0,
            ResultCondition::AnyError => self.errors() > 0,
        }
    }

    /// Search successful outputs, then failed outputs and their errors
    pub fn output_contains(&self, needle: &str) -> bool {
        let successes = self.hosts.iter().filter(|h| h.ok).map(|h| h.output.as_str());
        let failures = self
            .hosts
            .iter()
            .filter(|h| !h.ok)
            .flat_map(|h| [h.output.as_str(), h.error.as_deref().unwrap_or_default()]);
        let combined: Vec<&str> = successes.chain(failures).collect();
        combined.join("\n").contains(needle)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_plans: Vec<String>,
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

/// One entry of a plan's execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanItem<'a> {
    Plan(&'a str),
    Step { index: usize, step: &'a PlanStep },
}

impl Plan {
    /// Items in execution order
    pub fn sequence(&self) -> Vec<PlanItem<'_>> {
        let offset = self.referenced_plans.len();
        let references = self
            .referenced_plans
            .iter()
            .map(|name| (0, PlanItem::Plan(name.as_str())));
        let steps = self.steps.iter().enumerate().map(|(index, step)| {
            let position = step.execute_at_position.unwrap_or(index + offset);
            (position, PlanItem::Step { index, step })
        });
        let mut positioned: Vec<(usize, PlanItem<'_>)> = references.chain(steps).collect();

        // Unpositioned plans keep references first, then steps in order
        if self.steps.iter().any(|s| s.execute_at_position.is_some()) {
            positioned.sort_by_key(|(position, _)| *position);
        }
        positioned.into_iter().map(|(_, item)| item).collect()
    }
}

/// Where step `index` sits in `sequence`, or the end if it is absent
pub fn position_of(sequence: &[PlanItem<'_>], index: usize) -> usize {
    sequence
        .iter()
        .position(|item| matches!(item, PlanItem::Step { index: i, .. } if *i == index))
        .unwrap_or(sequence.len())
}

/// Validated set of named plans
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanBook {
    plans: BTreeMap<String, Plan>,
}

impl PlanBook {
    /// Check references, gates and jump targets, and reject cycles
    ///
    /// Step commands are not checked against action kinds here; whoever
    /// registers the book knows which kinds exist.
    pub fn new(plans: BTreeMap<String, Plan>) -> Result<Self, PlanError> {
        let book = Self { plans };
        for (name, plan) in &book.plans {
            book.check(name, plan)?;
        }
        for name in book.plans.keys() {
            book.check_acyclic(name, &mut Vec::new())?;
        }
        Ok(book)
    }

    pub fn get(&self, name: &str) -> Result<&Plan, PlanError> {
        self.plans
            .get(name)
            .ok_or_else(|| PlanError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plans.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Plan)> {
        self.plans.iter().map(|(name, plan)| (name.as_str(), plan))
    }

    fn check(&self, name: &str, plan: &Plan) -> Result<(), PlanError> {
        for reference in &plan.referenced_plans {
            if !self.contains(reference) {
                return Err(PlanError::UnknownReference {
                    plan: name.to_string(),
                    reference: reference.clone(),
                });
            }
        }

        for (index, step) in plan.steps.iter().enumerate() {
            let invalid = |reason: String| PlanError::InvalidStep {
                plan: name.to_string(),
                step: index,
                reason,
            };
            if step.command.trim().is_empty() {
                return Err(invalid("command must not be empty".to_string()));
            }
            match step.if_previous_command {
                Some(previous) if previous >= index => {
                    return Err(invalid(format!(
                        "if_previous_command {} is not an earlier step",
                        previous
                    )));
                }
                None if step.if_previous_command_result.is_some()
                    || step.if_previous_output_contains.is_some() =>
                {
                    return Err(invalid(
                        "conditions require if_previous_command".to_string(),
                    ));
                }
                _ => {}
            }
            for target in [step.on_success_jump_to, step.on_error_jump_to]
                .into_iter()
                .flatten()
            {
                if target >= plan.steps.len() {
                    return Err(invalid(format!("jump target {} is out of range", target)));
                }
            }
        }
        Ok(())
    }

    /// Follow references and plan-valued step commands depth first
    fn check_acyclic(&self, name: &str, path: &mut Vec<String>) -> Result<(), PlanError> {
        if path.iter().any(|p| p == name) {
            return Err(PlanError::Cycle(name.to_string()));
        }
        let Some(plan) = self.plans.get(name) else {
            return Ok(());
        };
        path.push(name.to_string());
        let nested = plan
            .steps
            .iter()
            .map(|step| &step.command)
            .filter(|command| self.contains(command));
        for child in plan.referenced_plans.iter().chain(nested) {
            self.check_acyclic(child, path)?;
        }
        path.pop();
        Ok(())
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
