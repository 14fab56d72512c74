// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durability across engine restarts

use cg_adapters::{ActionResolver, FakeAction, FakeBehavior};
use cg_core::{
    ActionSpec, Clock, EngineConfig, FakeClock, RetryBackoff, RunEvent, RunStatus,
    SequentialIdGen, TaskRun, TaskSpec, Trigger, INTERRUPTED,
};
use cg_engine::{Engine, RecoveryReport};
use cg_storage::TaskRepository;
use std::path::Path;
use std::time::Duration;

fn open(
    dir: &Path,
    prefix: &str,
    clock: &FakeClock,
    action: &FakeAction,
) -> (Engine<FakeClock, SequentialIdGen>, RecoveryReport) {
    let mut resolver = ActionResolver::new();
    resolver.register_instance("fake", action.clone());
    let config = EngineConfig::default().with_data_dir(dir);
    Engine::open(config, resolver, clock.clone(), SequentialIdGen::new(prefix)).unwrap()
}

fn backup_spec() -> TaskSpec {
    TaskSpec::new(
        "nightly backup",
        Trigger::cron("0 3 * * *").unwrap(),
        ActionSpec::new("fake").with_param("command", "restic backup"),
    )
    .with_retries(
        2,
        RetryBackoff::Fixed {
            delay: Duration::from_secs(30),
        },
    )
}

#[tokio::test]
async fn definitions_and_history_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let action = FakeAction::new("fake").always(FakeBehavior::Succeed("done".into()));

    let (engine, _) = open(dir.path(), "a", &clock, &action);
    let task = engine.create_task(backup_spec()).unwrap();
    engine.run_now(&task.id).unwrap();
    engine.wait_idle().await;
    let before = engine.get_status(&task.id).unwrap();
    drop(engine);

    let (engine, report) = open(dir.path(), "b", &clock, &action);
    assert_eq!(report, RecoveryReport::default());
    assert_eq!(engine.get_status(&task.id).unwrap(), before);
    assert_eq!(engine.list_tasks().unwrap(), vec![before.definition]);
}

#[tokio::test]
async fn run_in_flight_at_crash_is_retried_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let action = FakeAction::new("fake");

    let (engine, _) = open(dir.path(), "a", &clock, &action);
    let task = engine.create_task(backup_spec()).unwrap();
    drop(engine);

    // Leave a run marked running, as a crash mid-invocation would
    {
        let repo = TaskRepository::open(dir.path(), 0).unwrap();
        let run_id = repo.next_run_id(&task.id);
        let run = repo
            .insert_run(TaskRun::new(task.id.clone(), run_id, clock.now()))
            .unwrap();
        let (running, _) = run.transition(RunEvent::Start, &task, clock.now());
        repo.update_run(running).unwrap();
    }

    clock.advance(Duration::from_secs(60));
    let (engine, report) = open(dir.path(), "b", &clock, &action);
    assert_eq!(report.interrupted, 1);
    assert_eq!(report.retried, 1);

    let runs = engine.list_runs(&task.id).unwrap();
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].error.as_deref(), Some(INTERRUPTED));
    assert_eq!(runs[1].status, RunStatus::Pending);

    clock.advance(Duration::from_secs(30));
    assert_eq!(engine.tick().unwrap(), 1);
    engine.wait_idle().await;
    let latest = engine.get_status(&task.id).unwrap().latest_run.unwrap();
    assert_eq!(latest.status, RunStatus::Succeeded);
    assert_eq!(latest.attempt, 2);
    assert_eq!(action.call_count(), 1);
}

#[tokio::test]
async fn overdue_one_shot_fires_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let action = FakeAction::new("fake");

    let (engine, _) = open(dir.path(), "a", &clock, &action);
    let at = clock.now() + chrono::Duration::seconds(10);
    let task = engine
        .create_task(TaskSpec::new(
            "reminder",
            Trigger::OneShot { at },
            ActionSpec::new("fake"),
        ))
        .unwrap();
    drop(engine);

    clock.advance(Duration::from_secs(3600));
    let (engine, _) = open(dir.path(), "b", &clock, &action);
    assert_eq!(engine.tick().unwrap(), 1);
    engine.wait_idle().await;
    assert_eq!(engine.list_runs(&task.id).unwrap().len(), 1);
    assert_eq!(engine.tick().unwrap(), 0);
}
