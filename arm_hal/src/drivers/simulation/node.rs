//! Simulated VESC node.
//!
//! One `SimNode` per configured axis. Physics run in the joint domain:
//! - Current mode: free running at `amps × amps_to_dps`, reported current
//!   limited to the free-running draw until blocked
//! - RPM mode: constant joint speed, current rises to stall current when blocked
//! - Position mode: triangular velocity profile towards the reported-angle target
//!
//! The reported angle is `wrap(mechanical + pid_offset)`. A PID offset update
//! sets `pid_offset` so that the current mechanical angle reports as the given
//! value. Without a fresh command for `command_timeout` the node idles.

use super::SimulationConfig;
use arm_common::can::vesc::{MotorCommand, Telemetry};
use arm_common::units::{MotorGeometry, shortest_delta_deg, wrap_deg_0_360};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Active firmware control mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimMode {
    Idle,
    Current { amps: f64 },
    Rpm { joint_rpm: f64 },
    Position {
        target_deg: f64,
        max_vel_dps: f64,
        max_accel_dps2: f64,
    },
}

/// One emulated motor controller.
pub struct SimNode {
    node_id: u8,
    geometry: MotorGeometry,
    cfg: SimulationConfig,
    /// Continuous mechanical joint angle [deg].
    mech_deg: f64,
    /// Joint velocity [deg/s].
    vel_dps: f64,
    /// Motor current [A].
    current_a: f64,
    pid_offset_deg: f64,
    mode: SimMode,
    last_command: Option<Instant>,
    blocked: bool,
}

impl SimNode {
    pub fn new(node_id: u8, geometry: MotorGeometry, cfg: SimulationConfig) -> Self {
        Self {
            node_id,
            geometry,
            mech_deg: cfg.initial_deg,
            cfg,
            vel_dps: 0.0,
            current_a: 0.0,
            pid_offset_deg: 0.0,
            mode: SimMode::Idle,
            last_command: None,
            blocked: false,
        }
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn mode(&self) -> SimMode {
        self.mode
    }

    /// Continuous mechanical angle, independent of the PID offset.
    pub fn mechanical_deg(&self) -> f64 {
        self.mech_deg
    }

    /// Angle as the firmware reports it, in `[0, 360)`.
    pub fn reported_deg(&self) -> f64 {
        wrap_deg_0_360(self.mech_deg + self.pid_offset_deg)
    }

    pub fn current_a(&self) -> f64 {
        self.current_a
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Apply a decoded command addressed to this node.
    pub fn apply(&mut self, command: MotorCommand, now: Instant) {
        let mode = match command {
            MotorCommand::Current(amps) => SimMode::Current { amps },
            MotorCommand::CurrentBrake(_) | MotorCommand::Duty(_) => SimMode::Idle,
            MotorCommand::Rpm(erpm) => SimMode::Rpm {
                joint_rpm: self.geometry.joint_rpm(erpm as f64),
            },
            MotorCommand::Pos(deg) => SimMode::Position {
                target_deg: deg,
                max_vel_dps: self.cfg.default_max_vel_dps,
                max_accel_dps2: self.cfg.default_max_accel_dps2,
            },
            MotorCommand::PosWithLimits {
                pos_deg,
                max_vel_dps,
                max_accel_dps2,
            } => SimMode::Position {
                target_deg: pos_deg,
                max_vel_dps,
                max_accel_dps2,
            },
            MotorCommand::UpdatePidPosOffset { angle_deg, .. } => {
                self.pid_offset_deg = angle_deg - self.mech_deg;
                debug!(
                    "Sim node {}: PID offset set, mechanical {:.3} reports {:.3}",
                    self.node_id, self.mech_deg, angle_deg
                );
                return;
            }
        };
        // Zero current is the firmware's "release" command.
        self.mode = match mode {
            SimMode::Current { amps } if amps == 0.0 => SimMode::Idle,
            other => other,
        };
        self.last_command = Some(now);
    }

    /// Advance physics by `dt`.
    pub fn step(&mut self, dt: Duration, now: Instant) {
        let dt_s = dt.as_secs_f64();
        if dt_s <= 0.0 {
            return;
        }

        if self.mode != SimMode::Idle {
            let timed_out = self
                .last_command
                .is_none_or(|t| now.saturating_duration_since(t) > self.cfg.command_timeout());
            if timed_out {
                trace!("Sim node {}: command timeout, idling", self.node_id);
                self.mode = SimMode::Idle;
            }
        }

        let (desired_vel, drive_current) = match self.mode {
            SimMode::Idle => (0.0, 0.0),
            SimMode::Current { amps } => (amps * self.cfg.amps_to_dps, amps),
            SimMode::Rpm { joint_rpm } => (
                joint_rpm * 6.0,
                joint_rpm.signum() * self.cfg.stall_current_a,
            ),
            SimMode::Position {
                target_deg,
                max_vel_dps,
                max_accel_dps2,
            } => {
                let error = shortest_delta_deg(self.reported_deg(), target_deg);
                let acc = max_accel_dps2.abs().max(1e-6);
                let vel = (2.0 * acc * error.abs()).sqrt().min(max_vel_dps.abs());
                let desired = error.signum() * vel;
                let max_change = acc * dt_s;
                (
                    self.vel_dps + (desired - self.vel_dps).clamp(-max_change, max_change),
                    error.signum() * self.cfg.stall_current_a,
                )
            }
        };

        self.vel_dps = desired_vel;
        self.mech_deg += self.vel_dps * dt_s;
        self.blocked = self.clamp_to_hard_stops();

        self.current_a = if self.blocked {
            drive_current
        } else if self.vel_dps.abs() > 1e-6 {
            self.vel_dps.signum() * self.cfg.free_current_a.min(drive_current.abs())
        } else {
            0.0
        };
    }

    /// Keep the joint inside its mechanical range. Returns true when pushing
    /// against a stop.
    fn clamp_to_hard_stops(&mut self) -> bool {
        if let Some(min) = self.cfg.hard_stop_min_deg {
            if self.mech_deg <= min && self.vel_dps < 0.0 {
                self.mech_deg = min;
                self.vel_dps = 0.0;
                return true;
            }
        }
        if let Some(max) = self.cfg.hard_stop_max_deg {
            if self.mech_deg >= max && self.vel_dps > 0.0 {
                self.mech_deg = max;
                self.vel_dps = 0.0;
                return true;
            }
        }
        false
    }

    /// Status frames for the current state: STATUS, STATUS_4, STATUS_5.
    pub fn telemetry(&self) -> [Telemetry; 3] {
        let joint_rpm = self.vel_dps / 6.0;
        let duty = (self.vel_dps / self.cfg.max_speed_dps).clamp(-1.0, 1.0);
        [
            Telemetry::Status {
                erpm: self.geometry.erpm(joint_rpm).round() as i32,
                current_motor: self.current_a,
                duty,
            },
            Telemetry::Status4 {
                temp_fet: self.cfg.temp_fet_c,
                temp_motor: self.cfg.temp_motor_c,
                current_in: (self.current_a * duty).abs(),
                pos_deg: self.reported_deg(),
            },
            Telemetry::Status5 {
                voltage_in: self.cfg.voltage_in,
            },
        ]
    }
}
