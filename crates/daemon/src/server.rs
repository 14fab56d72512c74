// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use std::time::Instant;

use cg_core::{Clock, IdGen};
use cg_engine::{Engine, EngineError};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};

/// State shared by every connection handler
#[derive(Clone)]
pub struct ServerContext<C: Clock, I: IdGen> {
    pub engine: Engine<C, I>,
    pub start_time: Instant,
    /// Cancelled when a client asks the daemon to stop
    pub shutdown: CancellationToken,
}

/// Handle a single client connection
pub async fn handle_connection<C: Clock, I: IdGen>(
    ctx: ServerContext<C, I>,
    stream: UnixStream,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!(?request, "received request");
    let response = handle_request(&ctx, request).await;
    debug!(?response, "sending response");

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single request and return a response
pub async fn handle_request<C: Clock, I: IdGen>(
    ctx: &ServerContext<C, I>,
    request: Request,
) -> Response {
    let engine = &ctx.engine;
    let result = match request {
        Request::Ping => Ok(Response::Pong),

        Request::Hello { version: _ } => Ok(Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        }),

        Request::Shutdown => {
            ctx.shutdown.cancel();
            Ok(Response::ShuttingDown)
        }

        Request::Status => engine.status().map(|status| Response::Status {
            uptime_secs: ctx.start_time.elapsed().as_secs(),
            tasks: status.tasks,
            running: status.running,
            max_tasks: status.max_tasks,
        }),

        Request::CreateTask { spec } => engine.create_task(spec).map(|task| Response::Task {
            task: Box::new(task),
        }),

        Request::UpdateTask { id, patch, version } => engine
            .update_task(&id, patch, version)
            .map(|task| Response::Task {
                task: Box::new(task),
            }),

        Request::DeleteTask { id } => engine.delete_task(&id).await.map(|()| Response::Ok),

        Request::RunNow { id } => engine
            .run_now(&id)
            .map(|run_id| Response::RunStarted { run_id }),

        Request::CancelRun { id } => engine
            .cancel_run(&id)
            .await
            .map(|run_id| Response::RunCancelled { run_id }),

        Request::GetStatus { id } => engine.get_status(&id).map(|status| Response::TaskStatus {
            status: Box::new(status),
        }),

        Request::ListTasks => engine.list_tasks().map(|tasks| Response::Tasks { tasks }),

        Request::ListRuns { id } => engine.list_runs(&id).map(|runs| Response::Runs { runs }),
    };

    result.unwrap_or_else(error_response)
}

/// Map an engine error to its typed response
fn error_response(err: EngineError) -> Response {
    let message = err.to_string();
    match err {
        EngineError::NotFound(_) => Response::NotFound { message },
        EngineError::Conflict(_) => Response::Conflict { message },
        EngineError::Busy(_) => Response::Busy { message },
        EngineError::InvalidTask(_) | EngineError::NotRunning(_) => Response::Error { message },
        EngineError::Storage(_) => {
            error!(error = %message, "storage failure while serving request");
            Response::Error { message }
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
