// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const DEADLINE: Duration = Duration::from_secs(1);

#[tokio::test]
async fn script_runs_before_fallback() {
    let fake = FakeAction::new("fake")
        .then(FakeBehavior::Fail("first".to_string()))
        .always(FakeBehavior::Succeed("rest".to_string()));
    let params = Params::default();

    let first = fake
        .invoke(&params, DEADLINE, CancellationToken::new())
        .await
        .unwrap();
    assert!(!first.is_ok());
    assert_eq!(first.detail.as_deref(), Some("first"));

    for _ in 0..2 {
        let next = fake
            .invoke(&params, DEADLINE, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(next.output, b"rest");
    }
    assert_eq!(fake.call_count(), 3);
}

#[tokio::test]
async fn error_behavior_is_transport_error() {
    let fake = FakeAction::new("fake").always(FakeBehavior::Error("unreachable".to_string()));
    let err = fake
        .invoke(&Params::default(), DEADLINE, CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err, ActionError::Transport("unreachable".to_string()));
}

#[tokio::test]
async fn gate_holds_until_released_and_tracks_concurrency() {
    let fake = FakeAction::new("fake").gated();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let fake = fake.clone();
            tokio::spawn(async move {
                fake.invoke(&Params::default(), DEADLINE, CancellationToken::new())
                    .await
            })
        })
        .collect();

    while fake.active() < 3 {
        tokio::task::yield_now().await;
    }
    fake.release(3);
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_ok());
    }
    assert_eq!(fake.max_concurrency(), 3);
    assert_eq!(fake.active(), 0);
}

#[tokio::test]
async fn wait_for_cancel_returns_cancelled() {
    let fake = FakeAction::new("fake").always(FakeBehavior::WaitForCancel);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = fake
        .invoke(&Params::default(), DEADLINE, cancel)
        .await
        .unwrap_err();
    assert_eq!(err, ActionError::Cancelled);
}

#[tokio::test]
async fn dropped_invocation_releases_active_slot() {
    let fake = FakeAction::new("fake").always(FakeBehavior::Hang);
    let result = tokio::time::timeout(
        Duration::from_millis(20),
        fake.invoke(&Params::default(), DEADLINE, CancellationToken::new()),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(fake.active(), 0);
}
