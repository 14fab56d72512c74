// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task definitions
//!
//! A task definition is the durable description of an automation: when it
//! fires (its [`Trigger`]), what it does (its [`ActionSpec`]) and how
//! failures are handled. `next_fire_at` is derived and kept consistent with
//! the trigger and the enabled flag by every mutation in this module.

use crate::config::EngineConfig;
use crate::cron::{CronError, CronExpression};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Unique identifier for a task
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Optimistic concurrency token carried by every stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub u64);

impl Version {
    pub const INITIAL: Version = Version(1);

    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Longest interval, retry delay or timeout a task may carry
pub const MAX_TASK_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Errors from validating task definitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task name must not be empty")]
    EmptyName,
    #[error("action kind must not be empty")]
    EmptyActionKind,
    #[error("interval must be greater than zero")]
    ZeroInterval,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("{0} exceeds the 100 year limit")]
    DurationTooLong(&'static str),
    #[error("one-shot time {0} is not in the future")]
    OneShotInPast(DateTime<Utc>),
    #[error("invalid cron expression: {0}")]
    Cron(#[from] CronError),
}

/// When a task fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire once at a fixed time
    OneShot { at: DateTime<Utc> },
    /// Fire at `anchor + k * every`; the anchor defaults to the creation time
    Interval {
        #[serde(with = "humantime_serde")]
        every: Duration,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        anchor: Option<DateTime<Utc>>,
    },
    /// Fire on a five-field cron schedule (UTC)
    Cron { expression: CronExpression },
}

impl Trigger {
    pub fn interval(every: Duration) -> Self {
        Trigger::Interval {
            every,
            anchor: None,
        }
    }

    pub fn cron(expression: &str) -> Result<Self, CronError> {
        Ok(Trigger::Cron {
            expression: CronExpression::parse(expression)?,
        })
    }

    /// The first occurrence strictly after `after`
    ///
    /// `created_at` stands in for a missing interval anchor.
    pub fn next_after(
        &self,
        after: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Trigger::OneShot { at } => (*at > after).then_some(*at),
            Trigger::Interval { every, anchor } => {
                let anchor = anchor.unwrap_or(created_at);
                if anchor > after {
                    return Some(anchor);
                }
                let every_ms = chrono::Duration::from_std(*every).ok()?.num_milliseconds();
                if every_ms <= 0 {
                    return None;
                }
                let elapsed_ms = (after - anchor).num_milliseconds();
                let periods = elapsed_ms / every_ms + 1;
                let offset = periods
                    .checked_mul(every_ms)
                    .and_then(chrono::Duration::try_milliseconds)?;
                anchor.checked_add_signed(offset)
            }
            Trigger::Cron { expression } => expression.next_after(after),
        }
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(self, Trigger::OneShot { .. })
    }

    fn validate(&self, now: DateTime<Utc>) -> Result<(), TaskError> {
        match self {
            Trigger::OneShot { at } if *at <= now => Err(TaskError::OneShotInPast(*at)),
            Trigger::Interval { every, .. } if every.is_zero() => Err(TaskError::ZeroInterval),
            Trigger::Interval { every, .. } if *every > MAX_TASK_DURATION => {
                Err(TaskError::DurationTooLong("interval"))
            }
            _ => Ok(()),
        }
    }
}

/// What a task does: an action kind plus opaque parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl ActionSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Delay between a failed attempt and its retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryBackoff {
    Fixed {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    /// `base * 2^(attempt - 1)`, capped at `max`
    Exponential {
        #[serde(with = "humantime_serde")]
        base: Duration,
        #[serde(with = "humantime_serde")]
        max: Duration,
    },
}

impl RetryBackoff {
    /// Delay before retrying after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            RetryBackoff::Fixed { delay } => *delay,
            RetryBackoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                base.checked_mul(1u32 << shift)
                    .map_or(*max, |delay| delay.min(*max))
            }
        }
    }
}

impl RetryBackoff {
    /// The longest delay this backoff can produce
    fn ceiling(&self) -> Duration {
        match self {
            RetryBackoff::Fixed { delay } => *delay,
            RetryBackoff::Exponential { max, .. } => *max,
        }
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        RetryBackoff::Fixed {
            delay: Duration::from_secs(5),
        }
    }
}

/// Caller-supplied fields for creating a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub trigger: Trigger,
    pub action: ActionSpec,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff: Option<RetryBackoff>,
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

fn enabled_by_default() -> bool {
    true
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, trigger: Trigger, action: ActionSpec) -> Self {
        Self {
            name: name.into(),
            trigger,
            action,
            enabled: true,
            max_retries: None,
            retry_backoff: None,
            timeout: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: RetryBackoff) -> Self {
        self.max_retries = Some(max_retries);
        self.retry_backoff = Some(backoff);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Partial update of a task definition; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff: Option<RetryBackoff>,
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl TaskPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }
}

/// The stored form of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: TaskId,
    pub name: String,
    pub trigger: Trigger,
    pub action: ActionSpec,
    pub enabled: bool,
    pub max_retries: u32,
    pub retry_backoff: RetryBackoff,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskDefinition {
    /// Build a validated definition from a creation request
    pub fn new(
        id: TaskId,
        spec: TaskSpec,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, TaskError> {
        let mut task = TaskDefinition {
            id,
            name: spec.name,
            trigger: spec.trigger,
            action: spec.action,
            enabled: spec.enabled,
            max_retries: spec.max_retries.unwrap_or(config.default_max_retries),
            retry_backoff: spec
                .retry_backoff
                .unwrap_or_else(|| config.default_backoff.clone()),
            timeout: spec.timeout.unwrap_or(config.default_timeout),
            next_fire_at: None,
            version: Version::INITIAL,
            created_at: now,
            updated_at: now,
        };
        task.validate(now)?;
        task.refresh_next_fire(now);
        Ok(task)
    }

    /// Apply an edit, revalidate and recompute `next_fire_at`
    ///
    /// The version is left untouched; the repository bumps it on write.
    pub fn patched(&self, patch: TaskPatch, now: DateTime<Utc>) -> Result<Self, TaskError> {
        let trigger_changed = patch.trigger.is_some();
        let mut task = TaskDefinition {
            name: patch.name.unwrap_or_else(|| self.name.clone()),
            trigger: patch.trigger.unwrap_or_else(|| self.trigger.clone()),
            action: patch.action.unwrap_or_else(|| self.action.clone()),
            enabled: patch.enabled.unwrap_or(self.enabled),
            max_retries: patch.max_retries.unwrap_or(self.max_retries),
            retry_backoff: patch
                .retry_backoff
                .unwrap_or_else(|| self.retry_backoff.clone()),
            timeout: patch.timeout.unwrap_or(self.timeout),
            updated_at: now,
            ..self.clone()
        };
        if trigger_changed {
            task.trigger.validate(now)?;
        }
        task.validate_fields()?;
        task.refresh_next_fire(now);
        Ok(task)
    }

    /// Recompute `next_fire_at` from the trigger as of `now`
    pub fn refresh_next_fire(&mut self, now: DateTime<Utc>) {
        self.next_fire_at = if self.enabled {
            self.trigger.next_after(now, self.created_at)
        } else {
            None
        };
    }

    /// The definition after being fired at `now`
    ///
    /// One-shot tasks are disabled; recurring tasks move to their next
    /// occurrence strictly after `now`, so missed occurrences coalesce.
    pub fn fired(&self, now: DateTime<Utc>) -> Self {
        let mut task = self.clone();
        if task.trigger.is_one_shot() {
            task.enabled = false;
        }
        task.refresh_next_fire(now);
        task
    }

    /// Enabled and scheduled at or before `as_of`
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.enabled && self.next_fire_at.is_some_and(|at| at <= as_of)
    }

    fn validate(&self, now: DateTime<Utc>) -> Result<(), TaskError> {
        self.trigger.validate(now)?;
        self.validate_fields()
    }

    fn validate_fields(&self) -> Result<(), TaskError> {
        if self.name.trim().is_empty() {
            return Err(TaskError::EmptyName);
        }
        if self.action.kind.trim().is_empty() {
            return Err(TaskError::EmptyActionKind);
        }
        if self.timeout.is_zero() {
            return Err(TaskError::ZeroTimeout);
        }
        if self.timeout > MAX_TASK_DURATION {
            return Err(TaskError::DurationTooLong("timeout"));
        }
        if self.retry_backoff.ceiling() > MAX_TASK_DURATION {
            return Err(TaskError::DurationTooLong("retry backoff"));
        }
        if let Trigger::Interval { every, .. } = &self.trigger {
            if every.is_zero() {
                return Err(TaskError::ZeroInterval);
            }
            if *every > MAX_TASK_DURATION {
                return Err(TaskError::DurationTooLong("interval"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
