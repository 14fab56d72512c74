// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Action capabilities invoked by scheduled tasks

pub mod action;
pub mod resolver;
pub mod traced;

pub use action::{
    Action, ActionError, ActionOutcome, ActionStatus, HttpAction, Params, PlanAction, ShellAction,
    SshAction, WakeAction, MAX_STEP_EXECUTIONS,
};
pub use resolver::ActionResolver;
pub use traced::TracedAction;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use action::{FakeAction, FakeBehavior, FakeCall};
