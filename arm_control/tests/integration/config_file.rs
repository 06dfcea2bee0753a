//! Shipped configuration file drives a working controller.

use super::support::RecordingTransport;
use arm_common::config::{ArmConfig, ConfigError, ConfigLoader};
use arm_common::homing::{HomingDrive, HomingOverrides};
use arm_control::ArmController;
use std::io::Write;
use tempfile::NamedTempFile;

const SHIPPED: &str = include_str!("../../../config/arm.toml");

fn load(text: &str) -> ArmConfig {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    ArmConfig::load_validated(file.path()).unwrap()
}

#[test]
fn shipped_config_is_valid() {
    let config = load(SHIPPED);
    assert_eq!(config.node_ids(), vec![1, 2, 3]);
    assert_eq!(config.bus.driver, "simulation");

    let arm = ArmController::new(&config, RecordingTransport::new());
    assert_eq!(arm.node_ids(), vec![1, 2, 3]);
}

#[test]
fn shipped_axis_overrides_resolve() {
    let config = load(SHIPPED);
    let axis2 = config.axes.iter().find(|a| a.node_id == 2).unwrap();
    let params = axis2.homing.resolve(&config.homing);
    assert_eq!(params.drive, HomingDrive::Current { amps: 0.6 });
    assert_eq!(params.current_threshold_a, 0.55);
    assert_eq!(params.timeout_s, config.homing.timeout_s);

    let axis1 = config.axes.iter().find(|a| a.node_id == 1).unwrap();
    assert!(axis1.homing.is_empty());
    assert_eq!(
        HomingOverrides::default().resolve(&config.homing),
        axis1.homing.resolve(&config.homing)
    );
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let result = ArmConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}
