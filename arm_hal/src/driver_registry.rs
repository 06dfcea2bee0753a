//! Driver registry for CAN transports.
//!
//! Maps driver names (the `bus.driver` config key) to factories. Constructed
//! at startup and passed by value; no global state.

use arm_common::can::transport::{CanTransport, TransportError, TransportFactory};
use std::collections::HashMap;

/// Registry of available transport drivers.
pub struct TransportRegistry {
    factories: HashMap<&'static str, TransportFactory>,
}

impl TransportRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry pre-populated with the built-in drivers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Register a driver factory.
    ///
    /// # Panics
    /// Panics if a driver with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: TransportFactory) {
        if self.factories.contains_key(name) {
            panic!("Driver '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    pub fn get_factory(&self, name: &str) -> Option<TransportFactory> {
        self.factories.get(name).copied()
    }

    /// Create a transport instance by name.
    ///
    /// # Errors
    /// Returns `TransportError::DriverNotFound` if no driver has that name.
    pub fn create_transport(&self, name: &str) -> Result<Box<dyn CanTransport>, TransportError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| TransportError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// All registered driver names, sorted.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}
