use std::io::Write;

use applyflow::config::GlobalConfig;
use applyflow::AppError;

#[test]
fn defaults_apply_for_empty_config() {
    let config = GlobalConfig::from_toml_str("").expect("empty config is valid");
    assert_eq!(config.http_port, 8080);
    assert_eq!(config.subscriber_queue_capacity, 64);
    assert!(config.sweep.enabled);
    assert_eq!(config.sweep.idle_threshold_seconds, 900);
    assert_eq!(config.sweep.interval_seconds, 60);
}

#[test]
fn explicit_values_override_defaults() {
    let toml = r#"
http_port = 9090
db_path = "/tmp/applyflow-test.db"
subscriber_queue_capacity = 8

[sweep]
enabled = false
"#;
    let config = GlobalConfig::from_toml_str(toml).expect("valid config");
    assert_eq!(config.http_port, 9090);
    assert_eq!(config.subscriber_queue_capacity, 8);
    assert!(!config.sweep.enabled);
}

#[test]
fn zero_queue_capacity_rejected() {
    let result = GlobalConfig::from_toml_str("subscriber_queue_capacity = 0");
    assert!(result.is_err(), "zero capacity must fail validation");
}

#[test]
fn zero_sweep_threshold_rejected_when_enabled() {
    let toml = r"
[sweep]
enabled = true
idle_threshold_seconds = 0
";
    assert!(GlobalConfig::from_toml_str(toml).is_err());
}

#[test]
fn zero_sweep_threshold_allowed_when_disabled() {
    let toml = r"
[sweep]
enabled = false
idle_threshold_seconds = 0
";
    assert!(GlobalConfig::from_toml_str(toml).is_ok());
}

#[test]
fn malformed_toml_rejected() {
    assert!(GlobalConfig::from_toml_str("http_port = [").is_err());
}

#[test]
fn load_from_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "http_port = 7070").expect("write config");

    let config = GlobalConfig::load_from_path(file.path()).expect("load");
    assert_eq!(config.http_port, 7070);
}

#[test]
fn load_from_missing_path_is_config_error() {
    let err = GlobalConfig::load_from_path("/nonexistent/applyflow.toml").expect_err("missing");
    assert!(matches!(err, AppError::Config(_)));
}
