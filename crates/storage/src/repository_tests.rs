// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cg_core::{ActionSpec, EngineConfig, RunEvent, TaskPatch, TaskSpec, Trigger};
use chrono::TimeZone;
use std::time::Duration;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

fn open(retention: usize) -> (TempDir, TaskRepository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = TaskRepository::open(dir.path(), retention).unwrap();
    (dir, repo)
}

fn task(id: &str, every_secs: u64) -> TaskDefinition {
    let spec = TaskSpec::new(
        id,
        Trigger::interval(Duration::from_secs(every_secs)),
        ActionSpec::new("shell").with_param("command", "true"),
    );
    TaskDefinition::new(TaskId::new(id), spec, &EngineConfig::default(), t0()).unwrap()
}

fn insert_pending(repo: &TaskRepository, task_id: &TaskId, at: DateTime<Utc>) -> TaskRun {
    let run_id = repo.next_run_id(task_id);
    repo.insert_run(TaskRun::new(task_id.clone(), run_id, at))
        .unwrap()
}

fn finish(repo: &TaskRepository, task: &TaskDefinition, run: TaskRun) -> TaskRun {
    let (running, _) = run.transition(RunEvent::Start, task, t0());
    let running = repo.update_run(running).unwrap();
    let (done, _) = running.transition(RunEvent::Cancel, task, t0());
    repo.update_run(done).unwrap()
}

#[test]
fn create_then_get_round_trips() {
    let (_dir, repo) = open(0);
    let created = repo.create_task(task("a", 5)).unwrap();
    assert_eq!(repo.get_task(&TaskId::new("a")).unwrap(), created);
    assert_eq!(created.version, Version::INITIAL);
}

#[test]
fn duplicate_id_is_rejected() {
    let (_dir, repo) = open(0);
    repo.create_task(task("a", 5)).unwrap();
    let err = repo.create_task(task("a", 9)).unwrap_err();
    assert!(matches!(err, RepoError::Exists(_)));
}

#[test]
fn missing_task_is_not_found() {
    let (_dir, repo) = open(0);
    assert!(matches!(
        repo.get_task(&TaskId::new("nope")),
        Err(RepoError::NotFound(_))
    ));
    assert!(matches!(
        repo.delete_task(&TaskId::new("nope")),
        Err(RepoError::NotFound(_))
    ));
}

#[test]
fn update_bumps_version() {
    let (_dir, repo) = open(0);
    let created = repo.create_task(task("a", 5)).unwrap();
    let edited = created
        .patched(TaskPatch::enabled(false), t0() + secs(1))
        .unwrap();
    let stored = repo.update_task(edited).unwrap();
    assert_eq!(stored.version, Version(2));
    assert!(!repo.get_task(&created.id).unwrap().enabled);
}

#[test]
fn stale_update_conflicts() {
    let (_dir, repo) = open(0);
    let created = repo.create_task(task("a", 5)).unwrap();
    repo.update_task(created.clone()).unwrap();

    let err = repo.update_task(created).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Conflict {
            expected: Version(1),
            actual: Version(2),
            ..
        }
    ));
}

#[test]
fn list_tasks_is_ordered_by_id() {
    let (_dir, repo) = open(0);
    for id in ["c", "a", "b"] {
        repo.create_task(task(id, 5)).unwrap();
    }
    let ids: Vec<String> = repo
        .list_tasks()
        .unwrap()
        .into_iter()
        .map(|t| t.id.0)
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn list_due_returns_tasks_at_or_before_time() {
    let (_dir, repo) = open(0);
    repo.create_task(task("slow", 60)).unwrap();
    repo.create_task(task("fast", 5)).unwrap();

    assert!(repo.list_due(t0() + secs(4)).unwrap().is_empty());
    let due = repo.list_due(t0() + secs(5)).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, TaskId::new("fast"));
    assert_eq!(repo.list_due(t0() + secs(60)).unwrap().len(), 2);
}

#[test]
fn list_due_breaks_fire_time_ties_by_id() {
    let (dir, repo) = open(0);
    for id in ["b", "c", "a"] {
        repo.create_task(task(id, 5)).unwrap();
    }
    repo.create_task(task("z", 3)).unwrap();

    let ids = |repo: &TaskRepository| -> Vec<String> {
        repo.list_due(t0() + secs(5))
            .unwrap()
            .into_iter()
            .map(|t| t.id.0)
            .collect()
    };
    assert_eq!(ids(&repo), vec!["z", "a", "b", "c"]);

    drop(repo);
    let reopened = TaskRepository::open(dir.path(), 0).unwrap();
    assert_eq!(ids(&reopened), vec!["z", "a", "b", "c"]);
}

#[test]
fn disabled_task_is_never_due() {
    let (_dir, repo) = open(0);
    let created = repo.create_task(task("a", 5)).unwrap();
    let disabled = created.patched(TaskPatch::enabled(false), t0()).unwrap();
    repo.update_task(disabled).unwrap();

    assert!(repo.list_due(t0() + secs(3600)).unwrap().is_empty());
}

#[test]
fn due_index_follows_updates() {
    let (_dir, repo) = open(0);
    let created = repo.create_task(task("a", 5)).unwrap();
    let fired = created.fired(t0() + secs(5));
    repo.update_task(fired).unwrap();

    assert!(repo.list_due(t0() + secs(9)).unwrap().is_empty());
    assert_eq!(repo.list_due(t0() + secs(10)).unwrap().len(), 1);
}

#[test]
fn indexes_are_rebuilt_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let repo = TaskRepository::open(dir.path(), 0).unwrap();
        repo.create_task(task("a", 5)).unwrap();
        insert_pending(&repo, &TaskId::new("a"), t0() + secs(2));
    }
    let repo = TaskRepository::open(dir.path(), 0).unwrap();
    assert_eq!(repo.list_due(t0() + secs(5)).unwrap().len(), 1);
    assert_eq!(repo.pending_due(t0() + secs(2)).unwrap().len(), 1);
    // Run ids keep counting after a restart
    assert_eq!(repo.next_run_id(&TaskId::new("a")), RunId(2));
}

#[test]
fn run_ids_are_per_task_and_monotonic() {
    let (_dir, repo) = open(0);
    let a = TaskId::new("a");
    let b = TaskId::new("b");
    assert_eq!(repo.next_run_id(&a), RunId(1));
    assert_eq!(repo.next_run_id(&a), RunId(2));
    assert_eq!(repo.next_run_id(&b), RunId(1));
}

#[test]
fn runs_are_listed_in_numeric_order() {
    let (_dir, repo) = open(0);
    let id = TaskId::new("a");
    for _ in 0..11 {
        insert_pending(&repo, &id, t0());
    }
    let ids: Vec<u64> = repo
        .list_runs(&id)
        .unwrap()
        .into_iter()
        .map(|r| r.run_id.0)
        .collect();
    assert_eq!(ids, (1..=11).collect::<Vec<_>>());
    assert_eq!(repo.latest_run(&id).unwrap().unwrap().run_id, RunId(11));
}

#[test]
fn stale_run_update_conflicts() {
    let (_dir, repo) = open(0);
    let def = repo.create_task(task("a", 5)).unwrap();
    let run = insert_pending(&repo, &def.id, t0());
    let (started, _) = run.transition(RunEvent::Start, &def, t0());
    repo.update_run(started.clone()).unwrap();

    assert!(matches!(
        repo.update_run(started),
        Err(RepoError::Conflict { .. })
    ));
}

#[test]
fn pending_due_tracks_status() {
    let (_dir, repo) = open(0);
    let def = repo.create_task(task("a", 5)).unwrap();
    let later = insert_pending(&repo, &def.id, t0() + secs(30));
    let now = insert_pending(&repo, &def.id, t0());

    let due = repo.pending_due(t0()).unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].run_id, now.run_id);

    finish(&repo, &def, now);
    assert!(repo.pending_due(t0() + secs(10)).unwrap().is_empty());
    assert_eq!(repo.pending_due(t0() + secs(30)).unwrap()[0].run_id, later.run_id);
}

#[test]
fn active_run_ignores_terminal_runs() {
    let (_dir, repo) = open(0);
    let def = repo.create_task(task("a", 5)).unwrap();
    let run = insert_pending(&repo, &def.id, t0());
    assert!(repo.active_run(&def.id).unwrap().is_some());

    finish(&repo, &def, run);
    assert!(repo.active_run(&def.id).unwrap().is_none());
}

#[test]
fn retention_prunes_oldest_terminal_runs() {
    let (_dir, repo) = open(2);
    let def = repo.create_task(task("a", 5)).unwrap();
    for _ in 0..4 {
        let run = insert_pending(&repo, &def.id, t0());
        finish(&repo, &def, run);
    }
    let ids: Vec<u64> = repo
        .list_runs(&def.id)
        .unwrap()
        .into_iter()
        .map(|r| r.run_id.0)
        .collect();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn delete_removes_runs_and_indexes() {
    let (_dir, repo) = open(0);
    let def = repo.create_task(task("a", 5)).unwrap();
    insert_pending(&repo, &def.id, t0());

    repo.delete_task(&def.id).unwrap();
    assert!(repo.list_runs(&def.id).unwrap().is_empty());
    assert!(repo.list_due(t0() + secs(3600)).unwrap().is_empty());
    assert!(repo.pending_due(t0() + secs(3600)).unwrap().is_empty());
}
