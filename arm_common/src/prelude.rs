//! Prelude module for common re-exports.
//!
//! ```rust
//! use arm_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::axis::{AxisConfig, MotionLimits};
pub use crate::config::{ArmConfig, BusConfig, ConfigError, ConfigLoader, ControlConfig, LogLevel, SharedConfig};
pub use crate::homing::{
    HomingDefaults, HomingDirection, HomingDrive, HomingMode, HomingOverrides, HomingParams,
};

// ─── CAN ────────────────────────────────────────────────────────────
pub use crate::can::frame::{CanFrame, IdFormat};
pub use crate::can::transport::{CanTransport, FrameHandler, TransportError, TransportFactory};
pub use crate::can::vesc::{CodecError, MotorCommand, Telemetry, VescCodec, VescCommand};

// ─── Units ──────────────────────────────────────────────────────────
pub use crate::units::{GaugeRange, MotorGeometry};
