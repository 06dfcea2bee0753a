//! Receive path: frames through the controller into the telemetry store.

use super::support::{RecordingTransport, config, controller};
use arm_common::axis::AxisConfig;
use arm_common::can::frame::{CanFrame, IdFormat};
use arm_common::can::vesc::{Telemetry, VescCodec};
use arm_control::ArmController;
use std::time::Duration;

#[test]
fn status_frames_convert_with_axis_geometry() {
    let transport = RecordingTransport::new();
    let mut cfg = config(&[]);
    cfg.axes.push(AxisConfig {
        reduction_ratio: 80.0,
        motor_pole_pairs: 3.0,
        ..AxisConfig::new(3)
    });
    let arm = ArmController::new(&cfg, transport);
    let codec = VescCodec::default();

    arm.on_receive(
        &codec
            .status_frame(
                3,
                &Telemetry::Status {
                    erpm: 2400,
                    current_motor: 1.25,
                    duty: 0.5,
                },
            )
            .unwrap(),
    );
    arm.on_receive(
        &codec
            .status_frame(
                3,
                &Telemetry::Status4 {
                    temp_fet: 41.5,
                    temp_motor: 39.0,
                    current_in: 0.8,
                    pos_deg: 180.0,
                },
            )
            .unwrap(),
    );

    let t = arm.get_online_telemetry(3).unwrap();
    assert!((t.rpm.unwrap() - 10.0).abs() < 1e-9);
    assert!((t.deg_per_s.unwrap() - 60.0).abs() < 1e-9);
    assert_eq!(t.current_motor, Some(1.25));
    assert_eq!(t.pos_deg, Some(180.0));
    assert_eq!(t.temp_fet, Some(41.5));
    assert!(!t.offline);
}

#[test]
fn silent_axis_goes_offline() {
    let (arm, _bus) = controller(&[1]);
    let frame = VescCodec::default()
        .status_frame(1, &Telemetry::Status5 { voltage_in: 24.0 })
        .unwrap();
    arm.on_receive(&frame);
    assert_eq!(arm.get_telemetry(1).unwrap().voltage_in, Some(24.0));

    std::thread::sleep(Duration::from_millis(600));
    let t = arm.get_telemetry(1).unwrap();
    assert!(t.offline);
    assert_eq!(t.voltage_in, None);
    assert!(arm.get_online_telemetry(1).is_none());
    assert_eq!(arm.get_telemetry(1).unwrap(), t);
}

#[test]
fn foreign_and_malformed_frames_are_dropped() {
    let (arm, _bus) = controller(&[1]);
    // 11-bit frame on a 29-bit bus.
    let (id, ext) = IdFormat::Standard11Bit.pack(9, 1);
    arm.on_receive(&CanFrame::new(id, ext, &[0; 8]).unwrap());
    // Truncated STATUS.
    let (id, ext) = IdFormat::Extended29Bit.pack(9, 1);
    arm.on_receive(&CanFrame::new(id, ext, &[0; 3]).unwrap());
    assert!(arm.get_telemetry(1).is_none());
}

#[test]
fn frame_handler_outlives_controller_safely() {
    let (arm, _bus) = controller(&[1]);
    let handler = arm.frame_handler();
    let frame = VescCodec::default()
        .status_frame(1, &Telemetry::Status6)
        .unwrap();
    handler(&frame);
    assert!(arm.get_online_telemetry(1).is_some());

    drop(arm);
    handler(&frame);
}
