// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Task scheduling and execution engine

mod engine;
mod error;
mod executor;
mod recovery;
mod scheduler;

#[cfg(test)]
mod test_support;

pub use engine::{Engine, EngineStatus, TaskStatus};
pub use error::EngineError;
pub use recovery::RecoveryReport;
