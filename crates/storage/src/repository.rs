// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed repository over the key-value store
//!
//! Layout:
//! - `task:<id>` holds a serialized [`TaskDefinition`]
//! - `run:<task_id>:<run_id>` holds a serialized [`TaskRun`], with the run id
//!   zero-padded to 20 digits so a prefix scan yields runs in order
//!
//! The due index and the pending-run index live in memory and are rebuilt
//! from a full scan on open. Every read-modify-write holds the single writer
//! lock; writes use optimistic versioning against the stored record.

use crate::kv::{KvStore, StoreError};
use cg_core::{RunId, RunStatus, TaskDefinition, TaskId, TaskRun, Version};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

const TASK_PREFIX: &str = "task:";
const RUN_PREFIX: &str = "run:";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: Version,
        actual: Version,
    },
    #[error("already exists: {0}")]
    Exists(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct Indexes {
    /// `(next_fire_at, id)` for every task with a next fire time
    due: BTreeSet<(DateTime<Utc>, TaskId)>,
    fire_at: HashMap<TaskId, DateTime<Utc>>,
    /// `(scheduled_at, task_id, run_id)` for every pending run
    pending: BTreeSet<(DateTime<Utc>, TaskId, RunId)>,
    pending_at: HashMap<(TaskId, RunId), DateTime<Utc>>,
    /// Highest run id allocated per task
    last_run: HashMap<TaskId, RunId>,
}

impl Indexes {
    fn index_task(&mut self, task: &TaskDefinition) {
        if let Some(at) = self.fire_at.remove(&task.id) {
            self.due.remove(&(at, task.id.clone()));
        }
        if let Some(at) = task.next_fire_at.filter(|_| task.enabled) {
            self.due.insert((at, task.id.clone()));
            self.fire_at.insert(task.id.clone(), at);
        }
    }

    fn unindex_task(&mut self, id: &TaskId) {
        if let Some(at) = self.fire_at.remove(id) {
            self.due.remove(&(at, id.clone()));
        }
        self.last_run.remove(id);
        let runs: Vec<_> = self
            .pending_at
            .keys()
            .filter(|(task_id, _)| task_id == id)
            .cloned()
            .collect();
        for (task_id, run_id) in runs {
            if let Some(at) = self.pending_at.remove(&(task_id.clone(), run_id)) {
                self.pending.remove(&(at, task_id, run_id));
            }
        }
    }

    fn index_run(&mut self, run: &TaskRun) {
        let key = (run.task_id.clone(), run.run_id);
        if let Some(at) = self.pending_at.remove(&key) {
            self.pending.remove(&(at, key.0.clone(), key.1));
        }
        if run.status == RunStatus::Pending {
            self.pending
                .insert((run.scheduled_at, run.task_id.clone(), run.run_id));
            self.pending_at.insert(key, run.scheduled_at);
        }
        let last = self.last_run.entry(run.task_id.clone()).or_insert(run.run_id);
        if run.run_id > *last {
            *last = run.run_id;
        }
    }

    fn unindex_run(&mut self, task_id: &TaskId, run_id: RunId) {
        if let Some(at) = self.pending_at.remove(&(task_id.clone(), run_id)) {
            self.pending.remove(&(at, task_id.clone(), run_id));
        }
    }
}

/// Repository of task definitions and runs
pub struct TaskRepository {
    store: KvStore,
    /// Terminal runs kept per task; 0 keeps everything
    retention: usize,
    indexes: Mutex<Indexes>,
}

impl TaskRepository {
    /// Open the repository and rebuild its indexes from a full scan
    pub fn open(dir: impl Into<PathBuf>, retention: usize) -> Result<Self, RepoError> {
        let store = KvStore::open(dir)?;
        let mut indexes = Indexes::default();

        let mut tasks = 0;
        for (_, bytes) in store.scan(TASK_PREFIX)? {
            let task: TaskDefinition = serde_json::from_slice(&bytes)?;
            indexes.index_task(&task);
            tasks += 1;
        }
        let mut runs = 0;
        for (_, bytes) in store.scan(RUN_PREFIX)? {
            let run: TaskRun = serde_json::from_slice(&bytes)?;
            indexes.index_run(&run);
            runs += 1;
        }
        tracing::info!(
            tasks,
            runs,
            pending = indexes.pending.len(),
            "repository opened"
        );

        Ok(Self {
            store,
            retention,
            indexes: Mutex::new(indexes),
        })
    }

    // === Task definitions ===

    /// Insert a new definition; fails if the id is already taken
    pub fn create_task(&self, task: TaskDefinition) -> Result<TaskDefinition, RepoError> {
        let mut indexes = self.lock();
        let key = task_key(&task.id);
        if self.store.get(&key)?.is_some() {
            return Err(RepoError::Exists(format!("task {}", task.id)));
        }
        let task = TaskDefinition {
            version: Version::INITIAL,
            ..task
        };
        self.store.put(&key, &serde_json::to_vec(&task)?)?;
        indexes.index_task(&task);
        Ok(task)
    }

    pub fn get_task(&self, id: &TaskId) -> Result<TaskDefinition, RepoError> {
        self.read_task(id)?
            .ok_or_else(|| RepoError::NotFound(format!("task {}", id)))
    }

    /// Replace a definition if `task.version` matches the stored version
    ///
    /// Returns the stored definition with its bumped version.
    pub fn update_task(&self, task: TaskDefinition) -> Result<TaskDefinition, RepoError> {
        let mut indexes = self.lock();
        let key = task_key(&task.id);
        let current = self
            .read_task(&task.id)?
            .ok_or_else(|| RepoError::NotFound(format!("task {}", task.id)))?;
        if current.version != task.version {
            return Err(RepoError::Conflict {
                key,
                expected: task.version,
                actual: current.version,
            });
        }
        let task = TaskDefinition {
            version: task.version.next(),
            ..task
        };
        self.store.put(&key, &serde_json::to_vec(&task)?)?;
        indexes.index_task(&task);
        Ok(task)
    }

    /// Remove a definition and all of its runs
    pub fn delete_task(&self, id: &TaskId) -> Result<(), RepoError> {
        let mut indexes = self.lock();
        // Runs first; a partial delete leaves the definition to retry against
        for (key, _) in self.store.scan(&run_prefix(id))? {
            self.store.delete(&key)?;
        }
        if !self.store.delete(&task_key(id))? {
            return Err(RepoError::NotFound(format!("task {}", id)));
        }
        indexes.unindex_task(id);
        Ok(())
    }

    /// All definitions ordered by id
    pub fn list_tasks(&self) -> Result<Vec<TaskDefinition>, RepoError> {
        let mut tasks = self
            .store
            .scan(TASK_PREFIX)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice::<TaskDefinition>(&bytes))
            .collect::<Result<Vec<_>, _>>()?;
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    /// Enabled definitions with `next_fire_at <= as_of`, earliest first
    pub fn list_due(&self, as_of: DateTime<Utc>) -> Result<Vec<TaskDefinition>, RepoError> {
        let ids: Vec<TaskId> = {
            let indexes = self.lock();
            indexes
                .due
                .iter()
                .take_while(|(at, _)| *at <= as_of)
                .map(|(_, id)| id.clone())
                .collect()
        };
        let mut due = Vec::with_capacity(ids.len());
        for id in ids {
            // May have been deleted or edited since the index was read
            if let Some(task) = self.read_task(&id)? {
                if task.is_due(as_of) {
                    due.push(task);
                }
            }
        }
        Ok(due)
    }

    // === Runs ===

    /// Allocate the next run id for a task
    pub fn next_run_id(&self, task_id: &TaskId) -> RunId {
        let mut indexes = self.lock();
        let next = indexes
            .last_run
            .get(task_id)
            .map_or(RunId(1), |last| last.next());
        indexes.last_run.insert(task_id.clone(), next);
        next
    }

    /// Insert a new run record; fails if its key is already taken
    pub fn insert_run(&self, run: TaskRun) -> Result<TaskRun, RepoError> {
        let mut indexes = self.lock();
        let key = run_key(&run.task_id, run.run_id);
        if self.store.get(&key)?.is_some() {
            return Err(RepoError::Exists(format!("run {}/{}", run.task_id, run.run_id)));
        }
        let run = TaskRun {
            version: Version::INITIAL,
            ..run
        };
        self.store.put(&key, &serde_json::to_vec(&run)?)?;
        indexes.index_run(&run);
        Ok(run)
    }

    /// Replace a run if `run.version` matches the stored version
    ///
    /// Terminal writes prune the task's oldest terminal runs beyond the
    /// retention limit.
    pub fn update_run(&self, run: TaskRun) -> Result<TaskRun, RepoError> {
        let mut indexes = self.lock();
        let key = run_key(&run.task_id, run.run_id);
        let current = self
            .read_run(&key)?
            .ok_or_else(|| RepoError::NotFound(format!("run {}/{}", run.task_id, run.run_id)))?;
        if current.version != run.version {
            return Err(RepoError::Conflict {
                key,
                expected: run.version,
                actual: current.version,
            });
        }
        let run = TaskRun {
            version: run.version.next(),
            ..run
        };
        self.store.put(&key, &serde_json::to_vec(&run)?)?;
        indexes.index_run(&run);
        if run.is_terminal() {
            self.prune(&run.task_id, &mut indexes)?;
        }
        Ok(run)
    }

    pub fn get_run(&self, task_id: &TaskId, run_id: RunId) -> Result<TaskRun, RepoError> {
        self.read_run(&run_key(task_id, run_id))?
            .ok_or_else(|| RepoError::NotFound(format!("run {}/{}", task_id, run_id)))
    }

    /// Runs of a task ordered by run id
    pub fn list_runs(&self, task_id: &TaskId) -> Result<Vec<TaskRun>, RepoError> {
        self.scan_runs(&run_prefix(task_id))
    }

    /// Runs of every task, ordered by key
    pub fn list_all_runs(&self) -> Result<Vec<TaskRun>, RepoError> {
        self.scan_runs(RUN_PREFIX)
    }

    /// The run with the highest id, if any
    pub fn latest_run(&self, task_id: &TaskId) -> Result<Option<TaskRun>, RepoError> {
        Ok(self.list_runs(task_id)?.pop())
    }

    /// A pending or running run of the task, if any
    pub fn active_run(&self, task_id: &TaskId) -> Result<Option<TaskRun>, RepoError> {
        Ok(self
            .list_runs(task_id)?
            .into_iter()
            .rev()
            .find(|run| !run.is_terminal()))
    }

    /// Pending runs with `scheduled_at <= as_of`, earliest first
    pub fn pending_due(&self, as_of: DateTime<Utc>) -> Result<Vec<TaskRun>, RepoError> {
        let keys: Vec<(TaskId, RunId)> = {
            let indexes = self.lock();
            indexes
                .pending
                .iter()
                .take_while(|(at, _, _)| *at <= as_of)
                .map(|(_, task_id, run_id)| (task_id.clone(), *run_id))
                .collect()
        };
        let mut runs = Vec::with_capacity(keys.len());
        for (task_id, run_id) in keys {
            if let Some(run) = self.read_run(&run_key(&task_id, run_id))? {
                if run.is_pending() {
                    runs.push(run);
                }
            }
        }
        Ok(runs)
    }

    fn prune(&self, task_id: &TaskId, indexes: &mut Indexes) -> Result<(), RepoError> {
        if self.retention == 0 {
            return Ok(());
        }
        let terminal: Vec<TaskRun> = self
            .list_runs(task_id)?
            .into_iter()
            .filter(TaskRun::is_terminal)
            .collect();
        let excess = terminal.len().saturating_sub(self.retention);
        for run in terminal.into_iter().take(excess) {
            self.store.delete(&run_key(task_id, run.run_id))?;
            indexes.unindex_run(task_id, run.run_id);
            tracing::debug!(task_id = %task_id, run_id = %run.run_id, "pruned run");
        }
        Ok(())
    }

    fn read_task(&self, id: &TaskId) -> Result<Option<TaskDefinition>, RepoError> {
        match self.store.get(&task_key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_run(&self, key: &str) -> Result<Option<TaskRun>, RepoError> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_runs(&self, prefix: &str) -> Result<Vec<TaskRun>, RepoError> {
        self.store
            .scan(prefix)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(RepoError::from))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Indexes> {
        self.indexes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn task_key(id: &TaskId) -> String {
    format!("{}{}", TASK_PREFIX, id)
}

fn run_prefix(task_id: &TaskId) -> String {
    format!("{}{}:", RUN_PREFIX, task_id)
}

fn run_key(task_id: &TaskId, run_id: RunId) -> String {
    format!("{}{:020}", run_prefix(task_id), run_id.0)
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
