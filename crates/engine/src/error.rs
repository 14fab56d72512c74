// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use cg_core::{TaskError, TaskId};
use cg_storage::RepoError;
use thiserror::Error;

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("task {0} already has an active run")]
    Busy(TaskId),
    #[error("invalid task: {0}")]
    InvalidTask(String),
    #[error("task {0} has no active run")]
    NotRunning(TaskId),
    #[error("storage error: {0}")]
    Storage(RepoError),
}

impl From<RepoError> for EngineError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => EngineError::NotFound(what),
            RepoError::Conflict { .. } | RepoError::Exists(_) => {
                EngineError::Conflict(err.to_string())
            }
            RepoError::Store(_) | RepoError::Json(_) => EngineError::Storage(err),
        }
    }
}

impl From<TaskError> for EngineError {
    fn from(err: TaskError) -> Self {
        EngineError::InvalidTask(err.to_string())
    }
}
