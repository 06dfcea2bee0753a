//! End-to-end against the simulated bus: homing into a hard stop, then
//! position control from the new zero.

use super::support::config;
use arm_common::can::transport::CanTransport;
use arm_common::homing::{HomingMode, HomingOverrides};
use arm_control::ArmController;
use arm_hal::TransportRegistry;
use arm_hal::drivers::simulation::SimulatedBus;
use std::sync::Arc;
use std::time::Duration;

fn open_sim(nodes: &[u8]) -> (Arc<SimulatedBus>, ArmController) {
    let cfg = config(nodes);
    let mut bus = SimulatedBus::new();
    bus.open(&cfg.bus, &cfg.axes).unwrap();
    let bus = Arc::new(bus);
    let arm = ArmController::new(&cfg, bus.clone());
    bus.set_receiver(arm.frame_handler());
    (bus, arm)
}

#[test]
fn rpm_homing_finds_stop_and_backs_off() {
    let (bus, arm) = open_sim(&[1, 2]);
    std::thread::sleep(Duration::from_millis(50));
    assert!(arm.get_online_telemetry(1).is_some());

    let outcome = arm.home_axis(1, None).unwrap();
    assert!(outcome.is_homed(), "outcome {outcome:?}");
    assert!(arm.axis_status(1).unwrap().homed);

    // Stop at mechanical 0°, zeroed there, backed off 5° in the positive direction.
    let mech = bus.with_node(1, |n| n.mechanical_deg()).unwrap();
    assert!((mech - 5.0).abs() < 1.0, "mechanical {mech}");
    let reported = bus.with_node(1, |n| n.reported_deg()).unwrap();
    assert!((reported - 5.0).abs() < 1.0, "reported {reported}");

    // The other joint never moved.
    let other = bus.with_node(2, |n| n.mechanical_deg()).unwrap();
    assert!((other - 30.0).abs() < 1e-9);
    bus.close().unwrap();
}

#[test]
fn current_homing_and_position_control() {
    let (bus, arm) = open_sim(&[1]);
    let overrides = HomingOverrides {
        mode: Some(HomingMode::Current),
        current_a: Some(0.6),
        current_threshold_a: Some(0.55),
        backoff_deg: Some(0.0),
        ..Default::default()
    };
    std::thread::sleep(Duration::from_millis(30));
    assert!(arm.home_axis(1, Some(&overrides)).unwrap().is_homed());

    arm.set_target(1, 20.0).unwrap();
    arm.set_enabled(1, true).unwrap();
    arm.start().unwrap();
    std::thread::sleep(Duration::from_millis(1500));

    let t = arm.get_online_telemetry(1).unwrap();
    assert!((t.pos_deg.unwrap() - 20.0).abs() < 1.0, "telemetry {t:?}");
    arm.stop();
    bus.close().unwrap();
}

#[test]
fn registry_builds_simulation_transport() {
    let registry = TransportRegistry::with_builtin();
    let cfg = config(&[1]);
    let mut transport = registry.create_transport(&cfg.bus.driver).unwrap();
    transport.open(&cfg.bus, &cfg.axes).unwrap();
    let transport: Arc<dyn CanTransport> = Arc::from(transport);

    let arm = ArmController::new(&cfg, Arc::clone(&transport));
    transport.set_receiver(arm.frame_handler());
    std::thread::sleep(Duration::from_millis(50));

    let t = arm.get_online_telemetry(1).unwrap();
    assert!((t.pos_deg.unwrap() - 30.0).abs() < 0.05);
    assert_eq!(t.voltage_in, Some(24.0));
    transport.close().unwrap();
    assert!(transport.stats().unwrap().frames_received > 0);
}
