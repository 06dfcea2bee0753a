//! # Arm HAL Library
//!
//! CAN transport drivers with a pluggable registry. Drivers implement the
//! `CanTransport` trait defined in `arm_common::can::transport`.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Transport factory registration
//! - [`drivers`] - Transport implementations
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   send()    ┌──────────────────────┐
//! │  ArmController   │────────────►│  CanTransport        │
//! │  (arm_control)   │◄────────────│  (trait object)      │
//! └──────────────────┘  handler()  └──────────┬───────────┘
//!                                             │
//!                                  ┌──────────▼───────────┐
//!                                  │  TransportRegistry   │
//!                                  │  "simulation" → ...  │
//!                                  └──────────────────────┘
//! ```

#![deny(warnings)]

pub mod driver_registry;
pub mod drivers;

pub use crate::driver_registry::TransportRegistry;
