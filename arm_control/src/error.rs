//! Controller error types.
//!
//! Homing timeouts and cancellations are outcomes, not errors; see
//! [`HomingOutcome`](crate::command::homing::HomingOutcome).

use arm_common::can::transport::TransportError;
use arm_common::can::vesc::CodecError;
use thiserror::Error;

/// Errors surfaced by the command boundary.
#[derive(Debug, Clone, Error)]
pub enum ControlError {
    /// No axis with this node id is configured.
    #[error("Unknown axis {0}")]
    UnknownAxis(u8),

    /// Resolved homing parameters failed validation.
    #[error("Invalid homing parameters for axis {node_id}: {reason}")]
    InvalidHoming { node_id: u8, reason: String },

    /// Rejected runtime motion limits.
    #[error("Invalid motion limits for axis {node_id}: {reason}")]
    InvalidLimits { node_id: u8, reason: String },

    /// Target angle is NaN or infinite.
    #[error("Invalid target for axis {node_id}: {value}")]
    InvalidTarget { node_id: u8, value: f64 },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Worker thread could not be started.
    #[error("Failed to spawn {0} thread")]
    Spawn(String),
}
