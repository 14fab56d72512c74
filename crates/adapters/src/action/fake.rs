// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake action for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{Action, ActionError, ActionOutcome, Params};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Scripted result of one invocation
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    /// Return ok with this output
    Succeed(String),
    /// Return an error status with this detail
    Fail(String),
    /// Return an `ActionError::Transport` with this message
    Error(String),
    /// Never return and ignore cancellation
    Hang,
    /// Return `ActionError::Cancelled` once cancelled
    WaitForCancel,
}

/// Recorded invocation
#[derive(Debug, Clone)]
pub struct FakeCall {
    pub params: Params,
    pub deadline: Duration,
}

/// Fake action with scripted outcomes, an optional gate and concurrency
/// tracking
#[derive(Clone)]
pub struct FakeAction {
    kind: String,
    script: Arc<Mutex<VecDeque<FakeBehavior>>>,
    fallback: Arc<Mutex<FakeBehavior>>,
    calls: Arc<Mutex<Vec<FakeCall>>>,
    gate: Option<Arc<Semaphore>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl FakeAction {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(Mutex::new(FakeBehavior::Succeed("ok".to_string()))),
            calls: Arc::new(Mutex::new(Vec::new())),
            gate: None,
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Behavior once the script is exhausted
    pub fn always(self, behavior: FakeBehavior) -> Self {
        *self.fallback.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
        self
    }

    /// Queue a behavior for the next unscripted invocation
    pub fn then(self, behavior: FakeBehavior) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(behavior);
        self
    }

    /// Hold every invocation until [`FakeAction::release`] grants a permit
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Invocations currently in progress
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous invocations observed
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_behavior(&self) -> FakeBehavior {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted.unwrap_or_else(|| self.fallback.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

/// Decrements the active count even when the invocation future is dropped
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Action for FakeAction {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn invoke(
        &self,
        params: &Params,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(FakeCall {
                params: params.clone(),
                deadline,
            });
        let behavior = self.next_behavior();

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(Arc::clone(&self.active));

        if let Some(gate) = &self.gate {
            tokio::select! {
                permit = gate.acquire() => {
                    if let Ok(permit) = permit {
                        permit.forget();
                    }
                }
                _ = cancel.cancelled() => return Err(ActionError::Cancelled),
            }
        }

        match behavior {
            FakeBehavior::Succeed(output) => Ok(ActionOutcome::ok(output).with_exit_code(Some(0))),
            FakeBehavior::Fail(detail) => {
                Ok(ActionOutcome::error(Vec::new(), detail).with_exit_code(Some(1)))
            }
            FakeBehavior::Error(message) => Err(ActionError::Transport(message)),
            FakeBehavior::Hang => std::future::pending().await,
            FakeBehavior::WaitForCancel => {
                cancel.cancelled().await;
                Err(ActionError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
