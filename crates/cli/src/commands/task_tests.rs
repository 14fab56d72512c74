// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cg_core::{RetryBackoff, RunStatus};
use chrono::{TimeZone, Utc};
use std::time::Duration;

#[test]
fn parses_interval_task_file() {
    let spec = parse_spec(
        r#"
name = "backup"
max_retries = 2
timeout = "10m"

[trigger]
type = "interval"
every = "1h"

[retry_backoff]
type = "exponential"
base = "30s"
max = "5m"

[action]
kind = "shell"
params = { command = "restic backup /srv" }
"#,
    )
    .unwrap();

    assert_eq!(spec.name, "backup");
    assert!(spec.enabled);
    assert_eq!(spec.trigger, Trigger::interval(Duration::from_secs(3600)));
    assert_eq!(spec.max_retries, Some(2));
    assert_eq!(spec.timeout, Some(Duration::from_secs(600)));
    assert_eq!(
        spec.retry_backoff,
        Some(RetryBackoff::Exponential {
            base: Duration::from_secs(30),
            max: Duration::from_secs(300),
        })
    );
    assert_eq!(spec.action.kind, "shell");
    assert_eq!(spec.action.params["command"], "restic backup /srv");
}

#[test]
fn parses_cron_and_one_shot_triggers() {
    let cron = parse_spec(
        r#"
name = "wake"
trigger = { type = "cron", expression = "0 7 * * 1-5" }
action = { kind = "wake", params = { mac = "aa:bb:cc:dd:ee:ff" } }
"#,
    )
    .unwrap();
    assert_eq!(cron.trigger, Trigger::cron("0 7 * * 1-5").unwrap());

    let once = parse_spec(
        r#"
name = "later"
enabled = false
trigger = { type = "one_shot", at = "2030-01-01T00:00:00Z" }
action = { kind = "http", params = { url = "http://nas.local/health" } }
"#,
    )
    .unwrap();
    assert!(!once.enabled);
    assert_eq!(
        once.trigger,
        Trigger::OneShot {
            at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
        }
    );
}

#[test]
fn rejects_bad_task_files() {
    assert!(parse_spec("name = \"x\"").is_err());
    let bad_cron = r#"
name = "x"
trigger = { type = "cron", expression = "61 * * * *" }
action = { kind = "shell" }
"#;
    assert!(parse_spec(bad_cron).is_err());
}

#[test]
fn load_spec_names_the_file_on_error() {
    let err = load_spec(Path::new("/nonexistent/task.toml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/task.toml"));
}

#[test]
fn describes_triggers() {
    assert_eq!(
        describe_trigger(&Trigger::interval(Duration::from_secs(90))),
        "every 90s"
    );
    assert_eq!(
        describe_trigger(&Trigger::cron("@daily").unwrap()),
        "cron @daily"
    );
}

#[test]
fn run_row_shows_error() {
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let mut run = TaskRun::new(TaskId::new("a"), RunId(3), at);
    run.status = RunStatus::Failed;
    run.error = Some("exit 1".to_string());

    let line = RunRow(run).to_string();
    assert!(line.starts_with("#3"));
    assert!(line.contains("failed"));
    assert!(line.contains("started=-"));
    assert!(line.ends_with("error=exit 1"));
}
