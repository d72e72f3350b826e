use addendum_triage::config::{Config, ReasoningEffort, RunMode};
use std::time::Duration;

#[test]
fn parses_example_config() {
    let raw = include_str!("../addendum-triage.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse example config");
    cfg.validate().expect("example config is valid");

    assert_eq!(cfg.run.mode, RunMode::Production);
    assert_eq!(cfg.input.report_column_index, 8);
    assert_eq!(cfg.batch.batch_size, 10);
    assert_eq!(cfg.batch.random_seed, Some(789));
    assert_eq!(cfg.inference.reasoning_effort, ReasoningEffort::Medium);
    assert_eq!(cfg.retry.timeout(), Duration::from_secs(300));
    assert_eq!(cfg.retry.retry_timeout(), Duration::from_secs(600));
}

#[test]
fn partial_config_falls_back_to_defaults() {
    let cfg: Config = toml::from_str(
        r#"
[run]
mode = "test"

[batch]
sample_size = 5
"#,
    )
    .unwrap();
    cfg.validate().unwrap();

    assert_eq!(cfg.run.mode, RunMode::Test);
    assert_eq!(cfg.batch.sample_size, 5);
    assert_eq!(cfg.batch.batch_size, 10);
    assert_eq!(cfg.batch.random_seed, Some(789));
    assert_eq!(cfg.inference.model, "gpt-oss:20b");
    assert!(
        cfg.checkpoint_path()
            .ends_with("checkpoint.json")
    );
}

#[test]
fn zero_batch_size_means_unbounded() {
    let mut cfg = Config::default();
    cfg.batch.batch_size = 0;
    assert_eq!(cfg.batch_size(), None);
    cfg.batch.batch_size = 4;
    assert_eq!(cfg.batch_size(), Some(4));
}

#[test]
fn rejects_unusable_settings() {
    let mut cfg = Config::default();
    cfg.retry.max_attempts = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.run.mode = RunMode::Test;
    cfg.batch.sample_size = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.classification.marker_pattern = "(unclosed".to_string();
    assert!(cfg.validate().is_err());
    cfg.classification.prefilter_markers = false;
    assert!(cfg.validate().is_ok());
}
