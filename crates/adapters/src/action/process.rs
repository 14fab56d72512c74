// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared child-process handling for process-backed actions

use super::{ActionError, ActionOutcome};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Run a command to completion, capturing stdout then stderr
///
/// The child is spawned `kill_on_drop`, so cancelling (or dropping the
/// returned future on timeout) terminates it.
pub(crate) async fn run(
    mut command: Command,
    cancel: &CancellationToken,
) -> Result<ActionOutcome, ActionError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| ActionError::Spawn(e.to_string()))?;

    let output = tokio::select! {
        output = child.wait_with_output() => {
            output.map_err(|e| ActionError::Spawn(e.to_string()))?
        }
        _ = cancel.cancelled() => return Err(ActionError::Cancelled),
    };

    let mut captured = output.stdout;
    captured.extend_from_slice(&output.stderr);
    let code = output.status.code();

    if output.status.success() {
        Ok(ActionOutcome::ok(captured).with_exit_code(code))
    } else {
        let detail = match code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        };
        Ok(ActionOutcome::error(captured, detail).with_exit_code(code))
    }
}
