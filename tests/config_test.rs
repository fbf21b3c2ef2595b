//! Configuration loading tests.
//!
//! Tests the layered figment configuration:
//! - TOML file parsing, including humantime durations
//! - Defaults when the file is missing
//! - `PIXET_` environment overrides
//! - Semantic validation after extraction
//!
//! Tests touching the process environment run under `#[serial]`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use pixet_camera::config::AppConfig;
use pixet_camera::logging::OutputFormat;
use serial_test::serial;
use tempfile::TempDir;

fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixet.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
#[serial]
fn test_load_full_file() {
    let (_dir, path) = write_config(
        r#"
[device]
config_path = "/etc/pixet/WidePIX.xml"
energy_threshold = 6.5

[detector]
factory_dir = "/srv/pixet/factory"
operation_mode = "SPM_2ch"
stop_timeout = "750ms"
start_settle = "30ms"

[buffer]
slots = 16

[logging]
level = "debug"
format = "json"

[simulator]
full_name = "WidePIX 2x5 MPX3 W0029"
width = 1280
height = 512
chip_count = 10
counter_depth = 3
frame_period = "2ms"
"#,
    );

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(
        config.device.config_path,
        Some(PathBuf::from("/etc/pixet/WidePIX.xml"))
    );
    assert_eq!(config.device.energy_threshold, Some(6.5));
    assert_eq!(config.detector.factory_dir, PathBuf::from("/srv/pixet/factory"));
    assert_eq!(config.detector.operation_mode.as_deref(), Some("SPM_2ch"));
    assert_eq!(config.detector.stop_timeout, Duration::from_millis(750));
    assert_eq!(config.detector.start_settle, Duration::from_millis(30));
    assert_eq!(config.buffer.slots, 16);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, OutputFormat::Json);
    assert_eq!(config.simulator.chip_count, 10);
    assert_eq!(config.simulator.counter_depth, 3);
    assert_eq!(config.simulator.frame_period, Duration::from_millis(2));
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, AppConfig::default());
}

#[test]
#[serial]
fn test_partial_file_keeps_other_defaults() {
    let (_dir, path) = write_config("[buffer]\nslots = 8\n");
    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.buffer.slots, 8);
    assert_eq!(config.logging, AppConfig::default().logging);
    assert_eq!(config.detector, AppConfig::default().detector);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let (_dir, path) = write_config("[logging]\nlevel = \"warn\"\n");
    std::env::set_var("PIXET_LOGGING__LEVEL", "trace");
    std::env::set_var("PIXET_DETECTOR__ENERGY_THRESHOLD", "8.5");
    std::env::set_var("PIXET_DETECTOR__STOP_TIMEOUT", "2s");

    let result = AppConfig::load_from(&path);

    std::env::remove_var("PIXET_LOGGING__LEVEL");
    std::env::remove_var("PIXET_DETECTOR__ENERGY_THRESHOLD");
    std::env::remove_var("PIXET_DETECTOR__STOP_TIMEOUT");

    let config = result.unwrap();
    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.detector.energy_threshold, Some(8.5));
    assert_eq!(config.detector.stop_timeout, Duration::from_secs(2));
}

#[test]
#[serial]
fn test_out_of_range_threshold_rejected() {
    let (_dir, path) = write_config("[device]\nenergy_threshold = 200.0\n");
    let err = AppConfig::load_from(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("device.energy_threshold"), "{:#}", err);
}

#[test]
#[serial]
fn test_malformed_value_rejected() {
    let (_dir, path) = write_config("[detector]\nstop_timeout = \"soon\"\n");
    assert!(AppConfig::load_from(&path).is_err());

    let (_dir, path) = write_config("[logging]\nformat = \"xml\"\n");
    assert!(AppConfig::load_from(&path).is_err());
}

#[test]
#[serial]
fn test_bundled_config_is_valid() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/pixet.toml");
    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.simulator.full_name, "MiniPIX TPX3 J06-W0105");
    assert_eq!(config.detector.start_settle, Duration::from_millis(30));
}
