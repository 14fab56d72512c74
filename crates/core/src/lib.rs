// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! cg-core: Core types for the cg task scheduling engine
//!
//! This crate provides:
//! - Task definitions, triggers and cron expressions
//! - The pure task run state machine
//! - Execution plans composed of action steps
//! - Clock and id abstractions for deterministic tests
//! - Engine configuration

pub mod clock;
pub mod config;
pub mod cron;
pub mod id;

// State machines (order matters for dependencies)
pub mod task;
pub mod run;
pub mod plan;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use cron::{CronError, CronExpression};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use plan::{
    position_of, HostResult, Plan, PlanBook, PlanError, PlanItem, PlanStep, ResultCondition,
    StepResult,
};
pub use run::{RunEffect, RunEvent, RunId, RunOutput, RunStatus, TaskRun, INTERRUPTED};
pub use task::{
    ActionSpec, RetryBackoff, TaskDefinition, TaskError, TaskId, TaskPatch, TaskSpec, Trigger,
    Version,
};
