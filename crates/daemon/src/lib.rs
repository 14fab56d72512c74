// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cgd: the cg task scheduling daemon
//!
//! Owns the task engine and serves it over a Unix socket.

pub mod config;
pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use config::{ConfigError, DaemonConfig};
pub use lifecycle::STARTUP_MARKER_PREFIX;
pub use protocol::{ProtocolError, Request, Response};
