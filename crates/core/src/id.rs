// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task identifier generation

use crate::task::TaskId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hands out server-assigned task identifiers
pub trait IdGen: Clone + Send + Sync + 'static {
    fn next_task_id(&self) -> TaskId;
}

/// Short random identifiers for production use
///
/// Takes the first 12 hex digits of a v4 UUID; the repository still rejects
/// the (unlikely) collision with `Conflict`.
#[derive(Clone, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next_task_id(&self) -> TaskId {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        TaskId(simple[..12].to_string())
    }
}

/// Sequential ID generator for testing
///
/// Pads the counter so lexical order matches creation order.
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("task")
    }
}

impl IdGen for SequentialIdGen {
    fn next_task_id(&self) -> TaskId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        TaskId(format!("{}-{:04}", self.prefix, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_gen_creates_short_unique_ids() {
        let id_gen = UuidIdGen;
        let id1 = id_gen.next_task_id();
        let id2 = id_gen.next_task_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 12);
        assert!(id1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sequential_gen_creates_sortable_ids() {
        let id_gen = SequentialIdGen::new("t");
        assert_eq!(id_gen.next_task_id().as_str(), "t-0001");
        assert_eq!(id_gen.next_task_id().as_str(), "t-0002");
    }

    #[test]
    fn sequential_gen_is_cloneable_and_shared() {
        let id_gen1 = SequentialIdGen::new("shared");
        let id_gen2 = id_gen1.clone();
        assert_eq!(id_gen1.next_task_id().as_str(), "shared-0001");
        assert_eq!(id_gen2.next_task_id().as_str(), "shared-0002");
        assert_eq!(id_gen1.next_task_id().as_str(), "shared-0003");
    }
}
