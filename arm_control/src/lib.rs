//! # Arm Control Library
//!
//! Multi-axis controller for a robotic arm whose joints are VESC motor
//! controllers on a shared CAN bus. Tracks per-axis telemetry, runs the
//! periodic position control loop and supervises hard-stop homing.
//!
//! ## Layers
//!
//! 1. **Telemetry** ([`state::telemetry`]): decoded status frames with
//!    offline detection
//! 2. **Axis runtime** ([`state::axis`]): enable flag, target, zero, homed
//! 3. **Control loop** ([`cycle`]): fixed-rate position commands
//! 4. **Homing** ([`command::homing`]): drive, collision, commit, backoff
//! 5. **Facade** ([`controller::ArmController`]): the command boundary
//!
//! The transport is an external collaborator: the controller never opens or
//! closes the bus.

#![deny(warnings)]

pub mod bus;
pub mod command;
pub mod controller;
pub mod cycle;
pub mod error;
pub mod periodic;
pub mod state;

pub use controller::ArmController;
pub use error::ControlError;
