//! Homing sequence against a recording transport with injected telemetry.

use super::support::{Feeder, controller, current_homing, is_drive, is_stop};
use arm_common::can::vesc::{MotorCommand, VescCodec};
use arm_common::homing::HomingOverrides;
use arm_control::ControlError;
use arm_control::command::homing::{HomingOutcome, HomingPhase};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

#[test]
fn current_collision_commits_zero_once() {
    let (arm, bus) = controller(&[1, 2]);
    arm.set_enabled(2, true).unwrap();
    let _feeder = Feeder::start(Arc::clone(&arm), 1, 0.60, 42.0);
    std::thread::sleep(Duration::from_millis(20));

    let outcome = arm.home_axis(1, Some(&current_homing(3.0))).unwrap();

    match outcome {
        HomingOutcome::Homed { zero_abs_deg } => assert!((zero_abs_deg - 42.0).abs() < 0.05),
        other => panic!("unexpected outcome {other:?}"),
    }
    let offsets: Vec<_> = bus
        .commands_for(1)
        .into_iter()
        .filter(|c| matches!(c, MotorCommand::UpdatePidPosOffset { .. }))
        .collect();
    assert_eq!(
        offsets,
        vec![MotorCommand::UpdatePidPosOffset {
            angle_deg: 0.0,
            store: false
        }]
    );

    let status = arm.axis_status(1).unwrap();
    assert!(status.homed);
    assert!((status.zero_offset_deg - 42.0).abs() < 0.05);
    assert!(!status.enabled);
    assert!(arm.axis_status(2).unwrap().enabled);
    assert!(!arm.is_homing());

    // Cleanup leaves every axis released.
    assert!(is_stop(bus.commands_for(1).last().unwrap()));
    assert!(is_stop(bus.commands_for(2).last().unwrap()));
}

#[test]
fn drive_command_is_signed_by_direction() {
    let (arm, bus) = controller(&[1]);
    let outcome = arm.home_axis(1, Some(&current_homing(0.2))).unwrap();
    assert_eq!(outcome, HomingOutcome::TimedOut);

    let drives: Vec<_> = bus.commands_for(1).into_iter().filter(is_drive).collect();
    assert!(!drives.is_empty());
    for command in drives {
        assert_eq!(command, MotorCommand::Current(-0.3));
    }
}

#[test]
fn below_threshold_times_out_without_commit() {
    let (arm, bus) = controller(&[1]);
    let _feeder = Feeder::start(Arc::clone(&arm), 1, 0.30, 10.0);

    let start = Instant::now();
    let outcome = arm.home_axis(1, Some(&current_homing(0.3))).unwrap();
    assert_eq!(outcome, HomingOutcome::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(2));

    let commands = bus.commands_for(1);
    assert!(
        !commands
            .iter()
            .any(|c| matches!(c, MotorCommand::UpdatePidPosOffset { .. }))
    );
    assert!(is_stop(commands.last().unwrap()));
    assert!(!arm.axis_status(1).unwrap().homed);
}

#[test]
fn missing_telemetry_still_times_out() {
    let (arm, _bus) = controller(&[4]);
    let outcome = arm.home_axis(4, Some(&current_homing(0.25))).unwrap();
    assert_eq!(outcome, HomingOutcome::TimedOut);
}

#[test]
fn cancel_during_drive_stops_and_restores() {
    let (arm, bus) = controller(&[1, 2, 3]);
    arm.set_enabled(1, true).unwrap();
    arm.set_enabled(3, true).unwrap();
    let _feeder = Feeder::start(Arc::clone(&arm), 2, 0.1, 0.0);

    let worker = {
        let arm = Arc::clone(&arm);
        std::thread::spawn(move || arm.home_axis(2, Some(&current_homing(10.0))))
    };
    std::thread::sleep(Duration::from_millis(150));
    assert!(arm.is_homing());
    assert!(!arm.axis_status(1).unwrap().enabled);

    let cancelled_at = Instant::now();
    arm.cancel_homing();
    let outcome = worker.join().unwrap().unwrap();
    assert!(cancelled_at.elapsed() < Duration::from_millis(500));
    assert_eq!(
        outcome,
        HomingOutcome::Cancelled {
            phase: HomingPhase::Drive
        }
    );

    for node in [1, 2, 3] {
        assert!(is_stop(bus.commands_for(node).last().unwrap()));
    }
    assert!(arm.axis_status(1).unwrap().enabled);
    assert!(!arm.axis_status(2).unwrap().enabled);
    assert!(arm.axis_status(3).unwrap().enabled);
    assert!(!arm.axis_status(2).unwrap().homed);
}

#[test]
fn cancel_during_backoff_keeps_homed() {
    let (arm, _bus) = controller(&[1]);
    let _feeder = Feeder::start(Arc::clone(&arm), 1, 0.9, 15.0);
    let overrides = HomingOverrides {
        backoff_deg: Some(5.0),
        ..current_homing(3.0)
    };

    let worker = {
        let arm = Arc::clone(&arm);
        std::thread::spawn(move || arm.home_axis(1, Some(&overrides)))
    };
    // Collision after ~0.1 s; backoff then lasts over a second.
    std::thread::sleep(Duration::from_millis(600));
    arm.cancel_homing();

    let outcome = worker.join().unwrap().unwrap();
    assert_eq!(
        outcome,
        HomingOutcome::Cancelled {
            phase: HomingPhase::Backoff
        }
    );
    assert!(arm.axis_status(1).unwrap().homed);
}

#[test]
fn homing_calls_are_serialised() {
    let (arm, bus) = controller(&[1, 2]);
    let workers: Vec<_> = [1u8, 2]
        .into_iter()
        .map(|node| {
            let arm = Arc::clone(&arm);
            std::thread::spawn(move || arm.home_axis(node, Some(&current_homing(0.3))))
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap().unwrap(), HomingOutcome::TimedOut);
    }

    let commands = bus.commands();
    let drive_indices = |node: u8| -> Vec<usize> {
        commands
            .iter()
            .enumerate()
            .filter(|(_, (n, c))| *n == node && is_drive(c))
            .map(|(i, _)| i)
            .collect()
    };
    let first = drive_indices(1);
    let second = drive_indices(2);
    assert!(!first.is_empty() && !second.is_empty());
    let disjoint = first.last() < second.first() || second.last() < first.first();
    assert!(disjoint, "drive phases overlapped");
}

#[test]
fn enable_changes_during_homing_are_deferred() {
    let (arm, _bus) = controller(&[1, 2]);
    let worker = {
        let arm = Arc::clone(&arm);
        std::thread::spawn(move || arm.home_axis(2, Some(&current_homing(0.4))))
    };
    std::thread::sleep(Duration::from_millis(100));
    assert!(arm.is_homing());
    arm.set_enabled(1, true).unwrap();
    assert!(!arm.axis_status(1).unwrap().enabled);

    worker.join().unwrap().unwrap();
    assert!(arm.axis_status(1).unwrap().enabled);
}

#[test]
fn invalid_requests_are_rejected() {
    let (arm, bus) = controller(&[1]);
    assert!(matches!(
        arm.home_axis(9, None),
        Err(ControlError::UnknownAxis(9))
    ));

    let bad = HomingOverrides {
        timeout_s: Some(-1.0),
        ..Default::default()
    };
    assert!(matches!(
        arm.home_axis(1, Some(&bad)),
        Err(ControlError::InvalidHoming { node_id: 1, .. })
    ));
    assert!(matches!(
        arm.apply_homing_overrides(1, bad),
        Err(ControlError::InvalidHoming { .. })
    ));
    assert_eq!(bus.frame_count(), 0);
}

#[test]
fn failed_initial_drive_is_an_error_and_restores() {
    let (arm, bus) = controller(&[1]);
    arm.set_enabled(1, true).unwrap();
    bus.set_failing(true);
    let result = arm.home_axis(1, Some(&current_homing(1.0)));
    assert!(matches!(result, Err(ControlError::Transport(_))));
    assert!(arm.axis_status(1).unwrap().enabled);
    assert!(!arm.is_homing());
}

#[test]
fn home_all_runs_in_ascending_order() {
    let (arm, _bus) = controller(&[3, 1, 2]);
    let results = arm.home_all(Some(&current_homing(0.15)));
    let order: Vec<u8> = results.iter().map(|(n, _)| *n).collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert!(
        results
            .iter()
            .all(|(_, r)| matches!(r, Ok(HomingOutcome::TimedOut)))
    );
}

#[test]
fn cancel_stops_home_all_sweep() {
    let (arm, _bus) = controller(&[1, 2, 3]);
    let worker = {
        let arm = Arc::clone(&arm);
        std::thread::spawn(move || arm.home_all(Some(&current_homing(5.0))))
    };
    std::thread::sleep(Duration::from_millis(150));
    arm.cancel_homing();

    let results = worker.join().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, 1);
    assert!(matches!(
        results[0].1,
        Ok(HomingOutcome::Cancelled { .. })
    ));
}

#[test]
fn axis_overrides_apply_when_call_site_is_silent() {
    let (arm, bus) = controller(&[1]);
    arm.apply_homing_overrides(1, current_homing(0.15)).unwrap();
    assert_eq!(arm.home_axis(1, None).unwrap(), HomingOutcome::TimedOut);
    assert!(bus.commands_for(1).iter().any(is_drive));
}

#[test]
fn drive_command_is_resent_on_heartbeat() {
    let (arm, bus) = controller(&[1]);
    let overrides = HomingOverrides {
        command_period_s: Some(0.05),
        ..current_homing(0.5)
    };
    assert_eq!(arm.home_axis(1, Some(&overrides)).unwrap(), HomingOutcome::TimedOut);

    // 0.5 s at a 50 ms cadence, plus the initial drive.
    let drives = bus.commands_for(1).into_iter().filter(is_drive).count();
    assert!((6..=20).contains(&drives), "drive frames {drives}");
}

#[test]
fn idle_axes_get_zero_current_keepalive() {
    let (arm, bus) = controller(&[1, 2]);
    arm.set_enabled(2, true).unwrap();
    let overrides = HomingOverrides {
        command_period_s: Some(0.05),
        ..current_homing(0.5)
    };
    arm.home_axis(1, Some(&overrides)).unwrap();

    let idle = bus.commands_for(2);
    assert!(idle.len() >= 6, "keepalive frames {}", idle.len());
    assert!(idle.iter().all(is_stop));
    assert!(arm.axis_status(2).unwrap().enabled);
}

#[test]
fn keepalive_can_be_disabled() {
    let (arm, bus) = controller(&[1, 2]);
    let overrides = HomingOverrides {
        command_period_s: Some(0.05),
        send_idle_keepalive: Some(false),
        ..current_homing(0.5)
    };
    arm.home_axis(1, Some(&overrides)).unwrap();

    // Only the initial neutralise and the final cleanup.
    let idle = bus.commands_for(2);
    assert_eq!(idle.len(), 2);
    assert!(idle.iter().all(is_stop));
}

#[test]
fn backoff_keeps_heartbeat_and_idle_axes_alive() {
    let (arm, bus) = controller(&[1, 2]);
    let _feeder = Feeder::start(Arc::clone(&arm), 1, 0.9, 15.0);
    let overrides = HomingOverrides {
        backoff_deg: Some(5.0),
        command_period_s: Some(0.05),
        ..current_homing(3.0)
    };
    assert!(arm.home_axis(1, Some(&overrides)).unwrap().is_homed());

    let commands = bus.commands();
    let commit = commands
        .iter()
        .position(|(n, c)| *n == 1 && matches!(c, MotorCommand::UpdatePidPosOffset { .. }))
        .unwrap();
    let after = &commands[commit + 1..];

    // Backoff lasts ~1.2 s at 90 °/s with a 50 ms cadence, toward +5°.
    let holds: Vec<f64> = after
        .iter()
        .filter_map(|(n, c)| match c {
            MotorCommand::PosWithLimits { pos_deg, .. } if *n == 1 => Some(*pos_deg),
            _ => None,
        })
        .collect();
    assert!(holds.len() >= 10, "backoff frames {}", holds.len());
    assert!(holds.iter().all(|deg| (deg - 5.0).abs() < 1e-6));
    let idle = after.iter().filter(|(n, _)| *n == 2).count();
    assert!(idle >= 10, "idle keepalive frames {idle}");
}

#[test]
fn cancel_after_collision_stops_and_restores() {
    let (arm, bus) = controller(&[1, 2, 3]);
    arm.set_enabled(1, true).unwrap();
    arm.set_enabled(3, true).unwrap();
    let _feeder = Feeder::start(Arc::clone(&arm), 2, 0.9, 42.0);

    // Cancel the moment the zero offset goes out.
    let weak: Weak<_> = Arc::downgrade(&arm);
    bus.on_send(move |frame| {
        let committed = matches!(
            VescCodec::default().decode_command_frame(frame),
            Some(Ok((2, MotorCommand::UpdatePidPosOffset { .. })))
        );
        if committed {
            if let Some(arm) = weak.upgrade() {
                arm.cancel_homing();
            }
        }
    });

    let overrides = HomingOverrides {
        backoff_deg: Some(5.0),
        ..current_homing(3.0)
    };
    let outcome = arm.home_axis(2, Some(&overrides)).unwrap();
    assert_eq!(
        outcome,
        HomingOutcome::Cancelled {
            phase: HomingPhase::Commit
        }
    );

    let status = arm.axis_status(2).unwrap();
    assert!(status.homed);
    assert!(
        !bus.commands_for(2)
            .iter()
            .any(|c| matches!(c, MotorCommand::PosWithLimits { .. }))
    );
    for node in [1, 2, 3] {
        assert!(is_stop(bus.commands_for(node).last().unwrap()));
    }
    assert!(arm.axis_status(1).unwrap().enabled);
    assert!(!status.enabled);
    assert!(arm.axis_status(3).unwrap().enabled);
}

#[test]
fn oversized_backoff_is_rejected_before_motion() {
    let (arm, bus) = controller(&[1]);
    arm.set_enabled(1, true).unwrap();
    let huge = HomingOverrides {
        backoff_deg: Some(1e300),
        ..current_homing(1.0)
    };
    assert!(matches!(
        arm.home_axis(1, Some(&huge)),
        Err(ControlError::InvalidHoming { node_id: 1, .. })
    ));
    assert_eq!(bus.frame_count(), 0);
    assert!(arm.axis_status(1).unwrap().enabled);
}
