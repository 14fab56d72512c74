// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local shell command action
//!
//! Parameters: `command` (required), `cwd`, `env` (table).

use super::{process, Action, ActionError, ActionOutcome, Params};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct ShellAction;

impl ShellAction {
    pub const KIND: &'static str = "shell";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Action for ShellAction {
    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn invoke(
        &self,
        params: &Params,
        _deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        let script = params.require("command")?;

        let mut command = Command::new("sh");
        command.arg("-c").arg(&script);
        if let Some(cwd) = params.string("cwd")? {
            command.current_dir(cwd);
        }
        for (key, value) in params.string_map("env")? {
            command.env(key, value);
        }

        process::run(command, &cancel).await
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
