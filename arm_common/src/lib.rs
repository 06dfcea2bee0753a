//! Arm Common Library
//!
//! Shared types for every crate in the arm controller workspace: configuration
//! loading, per-axis and homing configuration, CAN framing, the VESC binary
//! protocol, and the transport seam towards the physical bus.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and the `ArmConfig` root
//! - [`axis`] - Per-axis configuration and motion limits
//! - [`homing`] - Homing parameters, overrides and resolution
//! - [`can`] - CAN frames, VESC codec, transport trait
//! - [`units`] - Angle wrapping and electrical/mechanical conversions
//! - [`consts`] - Workspace-wide numeric defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use arm_common::can::frame::IdFormat;
//! use arm_common::can::vesc::VescCodec;
//!
//! let codec = VescCodec::new(IdFormat::Extended29Bit);
//! let frame = codec.set_current(3, 1.5).unwrap();
//! assert_eq!(frame.id, (1 << 8) | 3);
//! ```

pub mod axis;
pub mod can;
pub mod config;
pub mod consts;
pub mod homing;
pub mod prelude;
pub mod units;
