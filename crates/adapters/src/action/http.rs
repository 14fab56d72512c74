// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP request action
//!
//! Parameters: `url` (required), `method` (default `GET`), `body`,
//! `headers` (table), `body_placeholders` (`text` or `json`, default
//! `text`). A 2xx status is success; the response body is the output.

use super::{Action, ActionError, ActionOutcome, Params};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct HttpAction;

impl HttpAction {
    pub const KIND: &'static str = "http";

    pub fn new() -> Self {
        Self
    }
}

/// A fully resolved request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn from_params(params: &Params) -> Result<Self, ActionError> {
        let url = params.require("url")?;
        let method = params
            .string("method")?
            .unwrap_or_else(|| "GET".to_string())
            .to_ascii_uppercase();
        if !matches!(
            method.as_str(),
            "GET" | "HEAD" | "DELETE" | "POST" | "PUT" | "PATCH"
        ) {
            return Err(ActionError::InvalidParams(format!(
                "unsupported method: {}",
                method
            )));
        }

        let body = match params.raw("body") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(text)) => {
                let mode = params.string("body_placeholders")?;
                Some(match mode.as_deref() {
                    None | Some("text") => params.substitute(text),
                    Some("json") => params.substitute_json(text)?,
                    Some(other) => {
                        return Err(ActionError::InvalidParams(format!(
                            "unknown body_placeholders mode: {}",
                            other
                        )))
                    }
                })
            }
            // Structured bodies are sent as JSON
            Some(value) => Some(value.to_string()),
        };

        Ok(Self {
            method,
            url,
            headers: params.string_map("headers")?,
            body,
        })
    }

    /// Send the request, blocking the current thread
    fn send(&self, deadline: Duration) -> Result<ActionOutcome, ActionError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(deadline))
            .http_status_as_error(false)
            .build()
            .into();

        let body = self.body.clone().unwrap_or_default();
        let result = match self.method.as_str() {
            "GET" => self.with_headers(agent.get(&self.url)).call(),
            "HEAD" => self.with_headers(agent.head(&self.url)).call(),
            "DELETE" => self.with_headers(agent.delete(&self.url)).call(),
            "POST" => self.with_headers(agent.post(&self.url)).send(body.as_str()),
            "PUT" => self.with_headers(agent.put(&self.url)).send(body.as_str()),
            _ => self.with_headers(agent.patch(&self.url)).send(body.as_str()),
        };
        let mut response = result.map_err(|e| ActionError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ActionError::Transport(format!("failed to read response: {}", e)))?;

        if status.is_success() {
            Ok(ActionOutcome::ok(text))
        } else {
            Ok(ActionOutcome::error(text, format!("HTTP status {}", status.as_u16())))
        }
    }

    fn with_headers<B>(&self, mut request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }
}

#[async_trait]
impl Action for HttpAction {
    fn kind(&self) -> &str {
        Self::KIND
    }

    async fn invoke(
        &self,
        params: &Params,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, ActionError> {
        let request = HttpRequest::from_params(params)?;
        let task = tokio::task::spawn_blocking(move || request.send(deadline));

        // The blocking request cannot be interrupted; it ends at the deadline
        tokio::select! {
            joined = task => joined.map_err(|e| ActionError::Transport(e.to_string()))?,
            _ = cancel.cancelled() => Err(ActionError::Cancelled),
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
