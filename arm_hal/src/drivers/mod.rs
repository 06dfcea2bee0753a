//! Transport driver implementations.
//!
//! - [`simulation`] - Emulated VESC bus for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement `CanTransport` from `arm_common::can::transport`
//! 3. Register it in [`register_all_drivers`]

pub mod simulation;

use crate::driver_registry::TransportRegistry;

/// Register all built-in drivers.
pub fn register_all_drivers(registry: &mut TransportRegistry) {
    registry.register(simulation::DRIVER_NAME, simulation::create_driver);
}
