//! Axis state module root.
//!
//! Telemetry is written by the receive path only; runtime state is written by
//! the command boundary and the homing supervisor.

pub mod axis;
pub mod telemetry;
