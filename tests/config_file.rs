//! Integration tests for loading roaster.toml from disk

use roastero_shared::{ConfigError, load_config};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
[serial]
port = "/dev/ttyACM0"
poll_interval_ms = 100

[pid]
kp = 0.2
"#,
    );
    let config = load_config(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.serial.port, "/dev/ttyACM0");
    assert_eq!(config.serial.poll_interval(), Duration::from_millis(100));
    assert_eq!(config.serial.baud, 115200);
    assert_eq!(config.serial.max_consecutive_failures, 5);
    assert_eq!(config.pid.kp, 0.2);
    assert_eq!(config.pid.ki, 0.90);
    assert_eq!(config.roast.idle_temp, 150);
    assert_eq!(config.roast.cooldown_seconds, 60);
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = write_config(
        r#"
[roast]
min_fan_speed = 8
max_fan_speed = 2
"#,
    );
    let err = load_config(file.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let file = write_config("[serial\nport = ");
    let err = load_config(file.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = load_config(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
