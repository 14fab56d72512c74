// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_document_yields_defaults() {
    let config = EngineConfig::from_toml("").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.max_tasks, 4);
    assert_eq!(config.tick_interval, Duration::from_secs(1));
    assert_eq!(config.output_cap, 65536);
}

#[test]
fn durations_parse_as_humantime() {
    let config = EngineConfig::from_toml(
        r#"
        max_tasks = 2
        tick_interval = "250ms"
        default_timeout = "2m"
        data_dir = "/var/lib/cg"

        [default_backoff]
        type = "exponential"
        base = "1s"
        max = "30s"
        "#,
    )
    .unwrap();

    assert_eq!(config.max_tasks, 2);
    assert_eq!(config.tick_interval, Duration::from_millis(250));
    assert_eq!(config.default_timeout, Duration::from_secs(120));
    assert_eq!(config.data_dir, PathBuf::from("/var/lib/cg"));
    assert_eq!(
        config.default_backoff,
        RetryBackoff::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    );
}

#[test]
fn zero_ceiling_is_rejected() {
    let err = EngineConfig::from_toml("max_tasks = 0").unwrap_err();
    assert!(matches!(err, ConfigError::Zero("max_tasks")));
}

#[test]
fn unparsable_duration_is_rejected() {
    let err = EngineConfig::from_toml(r#"tick_interval = "soon""#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn load_reports_missing_file() {
    let err = EngineConfig::load(Path::new("/nonexistent/cg/engine.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
