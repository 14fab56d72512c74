// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote command action over the system ssh client
//!
//! Parameters: `host` and `command` (required), `user`, `port`,
//! `identity_file`. The client runs in batch mode so it never prompts.

use super::{process, Action, ActionError, ActionOutcome, Params};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct SshAction {
    program: String,
}

impl Default for SshAction {
    fn default() -> Self {
        Self::new()
    }
}

impl SshAction {
    pub const KIND: &'static str = "ssh";

    pub fn new() -> Self {
        Self {
            program: "ssh".to_string(),
        }
    }

    /// Use a different client binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Client arguments for an invocation
    pub fn args(params: &Params, deadline: Duration) -> Result<Vec<String>, ActionError> {
        let host = params.require("host")?;
        let remote = params.require("command")?;
        let connect_timeout = deadline.as_secs().max(1);

        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", connect_timeout),
        ];
        if let Some(port) = params.port("port")? {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = params.string("identity_file")? {
            args.push("-i".to_string());
            args.push(identity);
        }
        let target = match params.string("user")? {
            Some(user) => format!("{}@{}", user, host),
            None => host,
        };
        if target.starts_with('-') {
            return Err(ActionError::InvalidParams(format!(
                "ssh target must not start with '-': {}",
                target
            )));
        }
        args.push(target);
        args.push("--".to_string());
        args.push(remote);
        Ok(args)
    }
}

#[async_trait]
impl Action for SshAction {
    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn invoke(
        &self,
        params: &Params,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        let mut command = Command::new(&self.program);
        command.args(Self::args(params, deadline)?);
        process::run(command, &cancel).await
    }
}

#[cfg(test)]
#[path = "ssh_tests.rs"]
mod tests;
