//! VESC CAN protocol codec.
//!
//! Pure functions between protocol-level commands/telemetry and raw
//! payload bytes. All multi-byte fields are big-endian two's complement
//! unless noted.
//!
//! # Outbound
//!
//! | Command | Payload | Scale |
//! |---------|---------|-------|
//! | `SET_DUTY` | i32 | duty × 1e5 |
//! | `SET_CURRENT` | i32 | A × 1000 |
//! | `SET_CURRENT_BRAKE` | i32 | A × 1000 |
//! | `SET_RPM` | i32 | electrical RPM |
//! | `SET_POS` | i32 | deg × 1e6, wrapped to [0, 360) |
//! | `SET_POS_LIM` | i32 + i16 + i16 | deg × 1e6, deg/s × 100, deg/s² × 10 |
//! | `UPDATE_PID_POS_OFFSET` | i32 + u8 | deg × 1e4 wrapped, store flag |
//!
//! # Inbound
//!
//! | Command | Min len | Fields |
//! |---------|---------|--------|
//! | `STATUS` | 8 | eRPM i32, I_motor i16 /1000, duty i16 /1000 |
//! | `STATUS_4` | 8 | T_fet i16 /10, T_motor i16 /10, I_in i16 /1000, pos i16 /50 |
//! | `STATUS_5` | 6 | V_in u16 /10 at bytes 4..6 |
//! | `STATUS_6` | 0 | not parsed |

use super::frame::{CanFrame, IdFormat, Payload};
use crate::units::wrap_deg_0_360;
use thiserror::Error;

/// VESC CAN packet ids used by the arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VescCommand {
    SetDuty = 0,
    SetCurrent = 1,
    SetCurrentBrake = 2,
    SetRpm = 3,
    SetPos = 4,
    Status = 9,
    Status2 = 14,
    Status3 = 15,
    Status4 = 16,
    Status5 = 27,
    Status6 = 28,
    UpdatePidPosOffset = 55,
    /// Position with trapezoid limits.
    SetPosLimits = 63,
}

impl VescCommand {
    #[inline]
    pub const fn id(self) -> u8 {
        self as u8
    }

    pub const fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => Self::SetDuty,
            1 => Self::SetCurrent,
            2 => Self::SetCurrentBrake,
            3 => Self::SetRpm,
            4 => Self::SetPos,
            9 => Self::Status,
            14 => Self::Status2,
            15 => Self::Status3,
            16 => Self::Status4,
            27 => Self::Status5,
            28 => Self::Status6,
            55 => Self::UpdatePidPosOffset,
            63 => Self::SetPosLimits,
            _ => return None,
        })
    }
}

/// Codec failure. Never fatal to the caller: inbound failures drop the frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("{command:?} payload too short: {len} < {min} bytes")]
    PayloadTooShort {
        command: VescCommand,
        len: usize,
        min: usize,
    },

    #[error("payload of {0} bytes exceeds CAN frame capacity")]
    PayloadTooLong(usize),

    #[error("unsupported command id {0}")]
    UnsupportedCommand(u8),

    #[error("non-finite value for {0}")]
    NonFinite(&'static str),
}

// ─── Field helpers ──────────────────────────────────────────────────

fn finite(value: f64, field: &'static str) -> Result<f64, CodecError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CodecError::NonFinite(field))
    }
}

/// `round(value × scale)` saturated to i32.
#[inline]
fn scaled_i32(value: f64, scale: f64) -> i32 {
    (value * scale).round() as i32
}

/// `round(value × scale)` saturated to i16.
#[inline]
fn scaled_i16(value: f64, scale: f64) -> i16 {
    (value * scale).round() as i16
}

/// Wrapped angle scaled to i32; an angle that rounds up to a full turn encodes as 0.
fn wrapped_angle(deg: f64, scale: f64) -> i32 {
    let raw = (wrap_deg_0_360(deg) * scale).round();
    if raw >= 360.0 * scale { 0 } else { raw as i32 }
}

fn payload(bytes: &[u8]) -> Result<Payload, CodecError> {
    Payload::from_slice(bytes).map_err(|_| CodecError::PayloadTooLong(bytes.len()))
}

fn require(command: VescCommand, data: &[u8], min: usize) -> Result<(), CodecError> {
    if data.len() < min {
        return Err(CodecError::PayloadTooShort {
            command,
            len: data.len(),
            min,
        });
    }
    Ok(())
}

#[inline]
fn be_i32(data: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

#[inline]
fn be_i16(data: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([data[at], data[at + 1]])
}

#[inline]
fn be_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

// ─── Encoders ───────────────────────────────────────────────────────

pub fn encode_set_duty(duty: f64) -> Result<Payload, CodecError> {
    let v = scaled_i32(finite(duty, "duty")?, 100_000.0);
    payload(&v.to_be_bytes())
}

pub fn encode_set_current(amps: f64) -> Result<Payload, CodecError> {
    let v = scaled_i32(finite(amps, "current")?, 1000.0);
    payload(&v.to_be_bytes())
}

pub fn encode_set_current_brake(amps: f64) -> Result<Payload, CodecError> {
    let v = scaled_i32(finite(amps, "brake current")?, 1000.0);
    payload(&v.to_be_bytes())
}

/// Electrical RPM, rounded to the nearest integer.
pub fn encode_set_rpm(erpm: f64) -> Result<Payload, CodecError> {
    let v = scaled_i32(finite(erpm, "erpm")?, 1.0);
    payload(&v.to_be_bytes())
}

pub fn encode_set_pos(deg: f64) -> Result<Payload, CodecError> {
    let v = wrapped_angle(finite(deg, "position")?, 1e6);
    payload(&v.to_be_bytes())
}

/// 8-byte position command with trapezoid limits.
///
/// Velocity and acceleration saturate at the i16 range.
pub fn encode_set_pos_with_limits(
    deg: f64,
    max_vel_dps: f64,
    max_accel_dps2: f64,
) -> Result<Payload, CodecError> {
    let pos = wrapped_angle(finite(deg, "position")?, 1e6);
    let vel = scaled_i16(finite(max_vel_dps, "max velocity")?, 100.0);
    let acc = scaled_i16(finite(max_accel_dps2, "max acceleration")?, 10.0);

    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(&pos.to_be_bytes());
    buf[4..6].copy_from_slice(&vel.to_be_bytes());
    buf[6..8].copy_from_slice(&acc.to_be_bytes());
    payload(&buf)
}

/// 5-byte PID position offset update: the given angle becomes the firmware's
/// current position. The trailing store flag is always 0 (not persisted).
pub fn encode_update_pid_pos_offset(deg: f64) -> Result<Payload, CodecError> {
    let angle = wrapped_angle(finite(deg, "offset angle")?, 1e4);
    let mut buf = [0u8; 5];
    buf[0..4].copy_from_slice(&angle.to_be_bytes());
    payload(&buf)
}

// ─── Decoders ───────────────────────────────────────────────────────

/// A decoded outbound command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotorCommand {
    Duty(f64),
    Current(f64),
    CurrentBrake(f64),
    Rpm(i32),
    Pos(f64),
    PosWithLimits {
        pos_deg: f64,
        max_vel_dps: f64,
        max_accel_dps2: f64,
    },
    UpdatePidPosOffset { angle_deg: f64, store: bool },
}

/// Inverse of the encoders.
pub fn decode_command(command: u8, data: &[u8]) -> Result<MotorCommand, CodecError> {
    let cmd = VescCommand::from_id(command).ok_or(CodecError::UnsupportedCommand(command))?;
    match cmd {
        VescCommand::SetDuty => {
            require(cmd, data, 4)?;
            Ok(MotorCommand::Duty(be_i32(data, 0) as f64 / 100_000.0))
        }
        VescCommand::SetCurrent => {
            require(cmd, data, 4)?;
            Ok(MotorCommand::Current(be_i32(data, 0) as f64 / 1000.0))
        }
        VescCommand::SetCurrentBrake => {
            require(cmd, data, 4)?;
            Ok(MotorCommand::CurrentBrake(be_i32(data, 0) as f64 / 1000.0))
        }
        VescCommand::SetRpm => {
            require(cmd, data, 4)?;
            Ok(MotorCommand::Rpm(be_i32(data, 0)))
        }
        VescCommand::SetPos => {
            require(cmd, data, 4)?;
            Ok(MotorCommand::Pos(be_i32(data, 0) as f64 / 1e6))
        }
        VescCommand::SetPosLimits => {
            require(cmd, data, 8)?;
            Ok(MotorCommand::PosWithLimits {
                pos_deg: be_i32(data, 0) as f64 / 1e6,
                max_vel_dps: be_i16(data, 4) as f64 / 100.0,
                max_accel_dps2: be_i16(data, 6) as f64 / 10.0,
            })
        }
        VescCommand::UpdatePidPosOffset => {
            require(cmd, data, 4)?;
            Ok(MotorCommand::UpdatePidPosOffset {
                angle_deg: be_i32(data, 0) as f64 / 1e4,
                store: data.get(4).is_some_and(|b| *b != 0),
            })
        }
        _ => Err(CodecError::UnsupportedCommand(command)),
    }
}

/// A decoded inbound status frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Telemetry {
    Status {
        erpm: i32,
        current_motor: f64,
        duty: f64,
    },
    Status4 {
        temp_fet: f64,
        temp_motor: f64,
        current_in: f64,
        pos_deg: f64,
    },
    Status5 {
        voltage_in: f64,
    },
    Status6,
}

/// Decode a status frame payload.
///
/// `STATUS_2`/`STATUS_3` and command frames are reported as unsupported.
pub fn decode_telemetry(command: u8, data: &[u8]) -> Result<Telemetry, CodecError> {
    let cmd = VescCommand::from_id(command).ok_or(CodecError::UnsupportedCommand(command))?;
    match cmd {
        VescCommand::Status => {
            require(cmd, data, 8)?;
            Ok(Telemetry::Status {
                erpm: be_i32(data, 0),
                current_motor: be_i16(data, 4) as f64 / 1000.0,
                duty: be_i16(data, 6) as f64 / 1000.0,
            })
        }
        VescCommand::Status4 => {
            require(cmd, data, 8)?;
            Ok(Telemetry::Status4 {
                temp_fet: be_i16(data, 0) as f64 / 10.0,
                temp_motor: be_i16(data, 2) as f64 / 10.0,
                current_in: be_i16(data, 4) as f64 / 1000.0,
                pos_deg: be_i16(data, 6) as f64 / 50.0,
            })
        }
        VescCommand::Status5 => {
            require(cmd, data, 6)?;
            Ok(Telemetry::Status5 {
                voltage_in: be_u16(data, 4) as f64 / 10.0,
            })
        }
        VescCommand::Status6 => Ok(Telemetry::Status6),
        _ => Err(CodecError::UnsupportedCommand(command)),
    }
}

// ─── Frame-level codec ──────────────────────────────────────────────

/// Frame builder bound to one addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VescCodec {
    pub id_format: IdFormat,
}

impl VescCodec {
    pub const fn new(id_format: IdFormat) -> Self {
        Self { id_format }
    }

    /// Address `data` to `node_id`.
    pub fn frame(&self, command: VescCommand, node_id: u8, data: Payload) -> CanFrame {
        let (id, extended) = self.id_format.pack(command.id(), node_id);
        CanFrame { id, extended, data }
    }

    /// `(command_id, node_id)` of a received frame, or `None` for foreign frames.
    #[inline]
    pub fn unpack(&self, frame: &CanFrame) -> Option<(u8, u8)> {
        self.id_format.unpack(frame.id, frame.extended)
    }

    pub fn set_duty(&self, node_id: u8, duty: f64) -> Result<CanFrame, CodecError> {
        Ok(self.frame(VescCommand::SetDuty, node_id, encode_set_duty(duty)?))
    }

    pub fn set_current(&self, node_id: u8, amps: f64) -> Result<CanFrame, CodecError> {
        Ok(self.frame(VescCommand::SetCurrent, node_id, encode_set_current(amps)?))
    }

    pub fn set_current_brake(&self, node_id: u8, amps: f64) -> Result<CanFrame, CodecError> {
        Ok(self.frame(
            VescCommand::SetCurrentBrake,
            node_id,
            encode_set_current_brake(amps)?,
        ))
    }

    pub fn set_rpm(&self, node_id: u8, erpm: f64) -> Result<CanFrame, CodecError> {
        Ok(self.frame(VescCommand::SetRpm, node_id, encode_set_rpm(erpm)?))
    }

    pub fn set_pos(&self, node_id: u8, deg: f64) -> Result<CanFrame, CodecError> {
        Ok(self.frame(VescCommand::SetPos, node_id, encode_set_pos(deg)?))
    }

    pub fn set_pos_with_limits(
        &self,
        node_id: u8,
        deg: f64,
        max_vel_dps: f64,
        max_accel_dps2: f64,
    ) -> Result<CanFrame, CodecError> {
        let data = encode_set_pos_with_limits(deg, max_vel_dps, max_accel_dps2)?;
        Ok(self.frame(VescCommand::SetPosLimits, node_id, data))
    }

    pub fn update_pid_pos_offset(&self, node_id: u8, deg: f64) -> Result<CanFrame, CodecError> {
        Ok(self.frame(
            VescCommand::UpdatePidPosOffset,
            node_id,
            encode_update_pid_pos_offset(deg)?,
        ))
    }

    /// Unpack and decode an outbound command frame.
    ///
    /// `None` for frames of another addressing mode.
    pub fn decode_command_frame(
        &self,
        frame: &CanFrame,
    ) -> Option<Result<(u8, MotorCommand), CodecError>> {
        let (command, node) = self.unpack(frame)?;
        Some(decode_command(command, frame.payload()).map(|cmd| (node, cmd)))
    }

    /// Build a status frame. Used by bus emulators.
    pub fn status_frame(&self, node_id: u8, telemetry: &Telemetry) -> Result<CanFrame, CodecError> {
        let (command, data) = encode_telemetry(telemetry)?;
        Ok(self.frame(command, node_id, data))
    }
}

/// Encode a status payload (the controller side of the protocol).
pub fn encode_telemetry(telemetry: &Telemetry) -> Result<(VescCommand, Payload), CodecError> {
    match *telemetry {
        Telemetry::Status {
            erpm,
            current_motor,
            duty,
        } => {
            let mut buf = [0u8; 8];
            buf[0..4].copy_from_slice(&erpm.to_be_bytes());
            buf[4..6].copy_from_slice(&scaled_i16(finite(current_motor, "current")?, 1000.0).to_be_bytes());
            buf[6..8].copy_from_slice(&scaled_i16(finite(duty, "duty")?, 1000.0).to_be_bytes());
            Ok((VescCommand::Status, payload(&buf)?))
        }
        Telemetry::Status4 {
            temp_fet,
            temp_motor,
            current_in,
            pos_deg,
        } => {
            let mut buf = [0u8; 8];
            buf[0..2].copy_from_slice(&scaled_i16(finite(temp_fet, "temp_fet")?, 10.0).to_be_bytes());
            buf[2..4].copy_from_slice(&scaled_i16(finite(temp_motor, "temp_motor")?, 10.0).to_be_bytes());
            buf[4..6].copy_from_slice(&scaled_i16(finite(current_in, "current_in")?, 1000.0).to_be_bytes());
            buf[6..8].copy_from_slice(&scaled_i16(finite(pos_deg, "position")?, 50.0).to_be_bytes());
            Ok((VescCommand::Status4, payload(&buf)?))
        }
        Telemetry::Status5 { voltage_in } => {
            let v = (finite(voltage_in, "voltage")? * 10.0).round().clamp(0.0, u16::MAX as f64) as u16;
            let mut buf = [0u8; 6];
            buf[4..6].copy_from_slice(&v.to_be_bytes());
            Ok((VescCommand::Status5, payload(&buf)?))
        }
        Telemetry::Status6 => Ok((VescCommand::Status6, Payload::new())),
    }
}
