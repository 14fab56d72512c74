// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action capability contract and the built-in kinds

mod http;
mod params;
mod plan;
mod process;
mod shell;
mod ssh;
mod wake;

pub use http::HttpAction;
pub use params::Params;
pub use plan::{PlanAction, MAX_STEP_EXECUTIONS};
pub use shell::ShellAction;
pub use ssh::SshAction;
pub use wake::WakeAction;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAction, FakeBehavior, FakeCall};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors raised before or while an action runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("unknown action kind: {0}")]
    UnknownKind(String),
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("failed to start: {0}")]
    Spawn(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("action cancelled")]
    Cancelled,
}

/// Whether the capability reports success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Ok,
    Error,
}

/// Result contract shared by every action kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub status: ActionStatus,
    pub output: Vec<u8>,
    pub exit_code: Option<i32>,
    pub detail: Option<String>,
}

impl ActionOutcome {
    pub fn ok(output: impl Into<Vec<u8>>) -> Self {
        Self {
            status: ActionStatus::Ok,
            output: output.into(),
            exit_code: None,
            detail: None,
        }
    }

    pub fn error(output: impl Into<Vec<u8>>, detail: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Error,
            output: output.into(),
            exit_code: None,
            detail: Some(detail.into()),
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ActionStatus::Ok
    }
}

/// An invokable side-effecting capability addressed by kind
///
/// Implementations should return promptly once `cancel` fires. The caller
/// enforces `deadline` independently by dropping the invocation future.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    fn kind(&self) -> &str;

    async fn invoke(
        &self,
        params: &Params,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError>;
}

#[async_trait]
impl<A: Action + ?Sized> Action for Arc<A> {
    fn kind(&self) -> &str {
        (**self).kind()
    }

    async fn invoke(
        &self,
        params: &Params,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        (**self).invoke(params, deadline, cancel).await
    }
}
