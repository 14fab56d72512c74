// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for engine unit tests

use crate::Engine;
use cg_adapters::{ActionResolver, FakeAction};
use cg_core::{
    ActionSpec, Clock, EngineConfig, FakeClock, SequentialIdGen, TaskDefinition, TaskSpec, Trigger,
};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) const KIND: &str = "fake";

pub(crate) struct Harness {
    pub dir: TempDir,
    pub clock: FakeClock,
    pub engine: Engine<FakeClock, SequentialIdGen>,
    pub action: FakeAction,
}

impl Harness {
    pub fn new(action: FakeAction) -> Self {
        Self::with_config(action, |_| {})
    }

    pub fn with_config(action: FakeAction, configure: impl FnOnce(&mut EngineConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();
        let mut config = EngineConfig::default().with_data_dir(dir.path());
        configure(&mut config);
        let engine = open_engine(dir.path(), config, &action, &clock);
        Self {
            dir,
            clock,
            engine,
            action,
        }
    }

    /// Advance the clock, tick and wait for every started run to finish
    pub async fn step(&self, secs: u64) -> usize {
        self.clock.advance(Duration::from_secs(secs));
        let launched = self.engine.tick().unwrap();
        self.engine.wait_idle().await;
        launched
    }

    /// Clock reading `secs` from now
    pub fn after(&self, secs: i64) -> DateTime<Utc> {
        self.clock.now() + chrono::Duration::seconds(secs)
    }

    pub fn every(&self, secs: u64) -> TaskDefinition {
        self.engine
            .create_task(spec(Trigger::interval(Duration::from_secs(secs))))
            .unwrap()
    }
}

pub(crate) fn open_engine(
    dir: &Path,
    config: EngineConfig,
    action: &FakeAction,
    clock: &FakeClock,
) -> Engine<FakeClock, SequentialIdGen> {
    let mut resolver = ActionResolver::new();
    resolver.register_instance(KIND, action.clone());
    let config = config.with_data_dir(dir);
    let (engine, _) =
        Engine::open(config, resolver, clock.clone(), SequentialIdGen::new("t")).unwrap();
    engine
}

pub(crate) fn spec(trigger: Trigger) -> TaskSpec {
    TaskSpec::new("job", trigger, ActionSpec::new(KIND))
}
