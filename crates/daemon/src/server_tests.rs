// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cg_adapters::{ActionResolver, FakeAction, FakeBehavior};
use cg_core::{
    ActionSpec, EngineConfig, FakeClock, RunId, RunStatus, SequentialIdGen, TaskId, TaskPatch,
    TaskSpec, Trigger, Version,
};
use std::time::Duration;
use tempfile::TempDir;

fn context(action: FakeAction) -> (TempDir, ServerContext<FakeClock, SequentialIdGen>) {
    let dir = tempfile::tempdir().unwrap();
    let mut resolver = ActionResolver::new();
    resolver.register_instance("fake", action);
    let config = EngineConfig::default().with_data_dir(dir.path());
    let (engine, _) =
        Engine::open(config, resolver, FakeClock::new(), SequentialIdGen::new("t")).unwrap();
    let ctx = ServerContext {
        engine,
        start_time: Instant::now(),
        shutdown: CancellationToken::new(),
    };
    (dir, ctx)
}

fn spec() -> TaskSpec {
    TaskSpec::new(
        "poll",
        Trigger::interval(Duration::from_secs(60)),
        ActionSpec::new("fake"),
    )
}

async fn create(ctx: &ServerContext<FakeClock, SequentialIdGen>) -> TaskId {
    match handle_request(ctx, Request::CreateTask { spec: spec() }).await {
        Response::Task { task } => task.id,
        other => panic!("unexpected response: {:?}", other),
    }
}

#[tokio::test]
async fn ping_and_hello() {
    let (_dir, ctx) = context(FakeAction::new("fake"));
    assert_eq!(handle_request(&ctx, Request::Ping).await, Response::Pong);
    let hello = handle_request(
        &ctx,
        Request::Hello {
            version: "0.0.0".into(),
        },
    )
    .await;
    assert_eq!(
        hello,
        Response::Hello {
            version: PROTOCOL_VERSION.to_string()
        }
    );
}

#[tokio::test]
async fn create_then_list_and_status() {
    let (_dir, ctx) = context(FakeAction::new("fake"));
    let id = create(&ctx).await;

    match handle_request(&ctx, Request::ListTasks).await {
        Response::Tasks { tasks } => assert_eq!(tasks[0].id, id),
        other => panic!("unexpected response: {:?}", other),
    }
    match handle_request(&ctx, Request::Status).await {
        Response::Status { tasks, running, .. } => {
            assert_eq!(tasks, 1);
            assert_eq!(running, 0);
        }
        other => panic!("unexpected response: {:?}", other),
    }
}

#[tokio::test]
async fn run_now_then_status_reports_run() {
    let (_dir, ctx) = context(FakeAction::new("fake").always(FakeBehavior::Succeed("up".into())));
    let id = create(&ctx).await;

    let started = handle_request(&ctx, Request::RunNow { id: id.clone() }).await;
    assert_eq!(started, Response::RunStarted { run_id: RunId(1) });
    ctx.engine.wait_idle().await;

    match handle_request(&ctx, Request::GetStatus { id: id.clone() }).await {
        Response::TaskStatus { status } => {
            let run = status.latest_run.unwrap();
            assert_eq!(run.status, RunStatus::Succeeded);
        }
        other => panic!("unexpected response: {:?}", other),
    }
    match handle_request(&ctx, Request::ListRuns { id }).await {
        Response::Runs { runs } => assert_eq!(runs.len(), 1),
        other => panic!("unexpected response: {:?}", other),
    }
}

#[tokio::test]
async fn engine_errors_map_to_typed_responses() {
    let (_dir, ctx) = context(FakeAction::new("fake").gated());
    let missing = TaskId::new("missing");
    assert!(matches!(
        handle_request(&ctx, Request::GetStatus { id: missing }).await,
        Response::NotFound { .. }
    ));

    let id = create(&ctx).await;
    let stale = Request::UpdateTask {
        id: id.clone(),
        patch: TaskPatch::enabled(false),
        version: Version(9),
    };
    assert!(matches!(
        handle_request(&ctx, stale).await,
        Response::Conflict { .. }
    ));

    handle_request(&ctx, Request::RunNow { id: id.clone() }).await;
    assert!(matches!(
        handle_request(&ctx, Request::RunNow { id: id.clone() }).await,
        Response::Busy { .. }
    ));

    let bad = TaskSpec::new(
        "bad",
        Trigger::interval(Duration::from_secs(1)),
        ActionSpec::new("nope"),
    );
    assert!(matches!(
        handle_request(&ctx, Request::CreateTask { spec: bad }).await,
        Response::Error { .. }
    ));

    assert!(matches!(
        handle_request(&ctx, Request::CancelRun { id: id.clone() }).await,
        Response::RunCancelled { .. }
    ));
    assert!(matches!(
        handle_request(&ctx, Request::CancelRun { id }).await,
        Response::Error { .. }
    ));
}

#[tokio::test]
async fn delete_removes_task() {
    let (_dir, ctx) = context(FakeAction::new("fake"));
    let id = create(&ctx).await;
    assert_eq!(
        handle_request(&ctx, Request::DeleteTask { id: id.clone() }).await,
        Response::Ok
    );
    assert!(matches!(
        handle_request(&ctx, Request::DeleteTask { id }).await,
        Response::NotFound { .. }
    ));
}

#[tokio::test]
async fn shutdown_request_signals_main_loop() {
    let (_dir, ctx) = context(FakeAction::new("fake"));
    assert_eq!(
        handle_request(&ctx, Request::Shutdown).await,
        Response::ShuttingDown
    );
    assert!(ctx.shutdown.is_cancelled());
}

#[tokio::test]
async fn serves_requests_over_unix_socket() {
    let (dir, ctx) = context(FakeAction::new("fake"));
    let socket = dir.path().join("test.sock");
    let listener = tokio::net::UnixListener::bind(&socket).unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        handle_connection(ctx, stream).await
    });

    let stream = tokio::net::UnixStream::connect(&socket).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    let data = protocol::encode(&Request::Ping).unwrap();
    protocol::write_message(&mut writer, &data).await.unwrap();
    let bytes = protocol::read_message(&mut reader).await.unwrap();
    let response: Response = protocol::decode(&bytes).unwrap();

    assert_eq!(response, Response::Pong);
    server.await.unwrap().unwrap();
}
