//! Control loop lifecycle and per-tick command generation.

use super::support::controller;
use arm_common::can::vesc::MotorCommand;
use arm_control::ControlError;
use std::time::Duration;

#[test]
fn only_enabled_axes_receive_clamped_targets() {
    let (arm, bus) = controller(&[1, 2]);
    arm.set_target(1, 400.0).unwrap();
    arm.set_enabled(1, true).unwrap();
    arm.set_target(2, 90.0).unwrap();

    arm.start().unwrap();
    std::thread::sleep(Duration::from_millis(60));
    arm.stop();

    let commands = bus.commands_for(1);
    assert!(commands.len() >= 3);
    for command in commands {
        match command {
            MotorCommand::PosWithLimits {
                pos_deg,
                max_vel_dps,
                max_accel_dps2,
            } => {
                assert!((pos_deg - 359.999).abs() < 1e-6);
                assert!((max_vel_dps - 90.0).abs() < 0.01);
                assert!((max_accel_dps2 - 180.0).abs() < 0.1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(bus.commands_for(2).is_empty());
    assert_eq!(arm.axis_status(1).unwrap().target_deg, 400.0);
}

#[test]
fn start_and_stop_are_idempotent() {
    let (arm, bus) = controller(&[1]);
    assert!(!arm.is_running());
    arm.start().unwrap();
    arm.start().unwrap();
    assert!(arm.is_running());

    std::thread::sleep(Duration::from_millis(30));
    let stats = arm.cycle_stats().unwrap();
    assert!(stats.ticks > 0);
    assert_eq!(stats.axis_errors, 0);

    arm.stop();
    arm.stop();
    assert!(!arm.is_running());
    assert!(arm.cycle_stats().is_none());
    // Disabled axis: idle ticks only.
    assert_eq!(bus.frame_count(), 0);
}

#[test]
fn loop_survives_send_failures() {
    let (arm, bus) = controller(&[1, 2]);
    arm.set_enabled(1, true).unwrap();
    arm.set_enabled(2, true).unwrap();
    bus.set_failing(true);

    arm.start().unwrap();
    std::thread::sleep(Duration::from_millis(40));
    let stats = arm.cycle_stats().unwrap();
    assert!(arm.is_running());
    assert!(stats.axis_errors >= 2);

    bus.set_failing(false);
    std::thread::sleep(Duration::from_millis(30));
    arm.stop();
    assert!(!bus.commands_for(1).is_empty());
    assert!(!bus.commands_for(2).is_empty());
}

#[test]
fn runtime_limits_change_commands() {
    let (arm, bus) = controller(&[5]);
    arm.apply_motion_limits(5, Some(30.0), Some(60.0)).unwrap();
    assert!(matches!(
        arm.apply_motion_limits(5, Some(0.0), None),
        Err(ControlError::InvalidLimits { node_id: 5, .. })
    ));
    arm.set_target(5, 45.0).unwrap();
    arm.set_enabled(5, true).unwrap();

    arm.start().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    arm.stop();

    match bus.commands_for(5).last() {
        Some(MotorCommand::PosWithLimits {
            pos_deg,
            max_vel_dps,
            max_accel_dps2,
        }) => {
            assert!((pos_deg - 45.0).abs() < 1e-6);
            assert!((max_vel_dps - 30.0).abs() < 0.01);
            assert!((max_accel_dps2 - 60.0).abs() < 0.1);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_axis_is_rejected() {
    let (arm, _bus) = controller(&[1]);
    assert!(matches!(arm.set_target(7, 1.0), Err(ControlError::UnknownAxis(7))));
    assert!(matches!(arm.set_enabled(7, true), Err(ControlError::UnknownAxis(7))));
    assert!(arm.axis_status(7).is_none());
}

#[test]
fn non_finite_targets_are_rejected() {
    let (arm, _bus) = controller(&[1]);
    arm.set_target(1, 30.0).unwrap();
    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        assert!(matches!(
            arm.set_target(1, bad),
            Err(ControlError::InvalidTarget { node_id: 1, .. })
        ));
    }
    assert_eq!(arm.axis_status(1).unwrap().target_deg, 30.0);

    arm.set_enabled(1, true).unwrap();
    arm.start().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(arm.cycle_stats().unwrap().axis_errors, 0);
    arm.stop();
}
