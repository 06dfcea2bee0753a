//! CAN bus types.
//!
//! - [`frame`] - Raw frame and arbitration-id packing
//! - [`vesc`] - VESC command/telemetry codec
//! - [`transport`] - Transport trait implemented by bus drivers

pub mod frame;
pub mod transport;
pub mod vesc;
