// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced action wrapper for consistent observability

use crate::action::{Action, ActionError, ActionOutcome, Params};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Wrapper that adds tracing to any Action
#[derive(Clone)]
pub struct TracedAction<A> {
    inner: A,
}

impl<A> TracedAction<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<A: Action> Action for TracedAction<A> {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    async fn invoke(
        &self,
        params: &Params,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        let span = tracing::info_span!(
            "action.invoke",
            kind = self.inner.kind(),
            deadline_ms = deadline.as_millis() as u64
        );

        async {
            tracing::info!("starting");

            let start = std::time::Instant::now();
            let result = self.inner.invoke(params, deadline, cancel).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(outcome) if outcome.is_ok() => tracing::info!(
                    elapsed_ms,
                    output_len = outcome.output.len(),
                    "succeeded"
                ),
                Ok(outcome) => tracing::warn!(
                    elapsed_ms,
                    exit_code = ?outcome.exit_code,
                    detail = outcome.detail.as_deref().unwrap_or(""),
                    "reported failure"
                ),
                Err(ActionError::Cancelled) => tracing::info!(elapsed_ms, "cancelled"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "failed"),
            }

            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
