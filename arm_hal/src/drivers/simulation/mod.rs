//! Simulation transport.
//!
//! Emulates a CAN bus with one VESC node per configured axis, for development
//! and testing without hardware. Driver-specific settings live under
//! `[bus.driver_config.simulation]`.

mod driver;
mod node;

pub use driver::SimulatedBus;
pub use node::{SimMode, SimNode};

use arm_common::can::transport::{CanTransport, TransportError};
use arm_common::config::BusConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Registry name of this driver.
pub const DRIVER_NAME: &str = "simulation";

/// Factory function to create a simulation transport instance.
pub fn create_driver() -> Box<dyn CanTransport> {
    Box::new(SimulatedBus::new())
}

/// Emulated node behaviour, shared by all nodes on the bus.
///
/// # TOML Example
///
/// ```toml
/// [bus.driver_config.simulation]
/// initial_deg = 30.0
/// hard_stop_min_deg = 0.0
/// status_period_ms = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Mechanical angle of every joint at power-up [deg].
    pub initial_deg: f64,
    /// Lower mechanical stop [deg].
    pub hard_stop_min_deg: Option<f64>,
    /// Upper mechanical stop [deg].
    pub hard_stop_max_deg: Option<f64>,
    /// Physics step [ms].
    pub step_ms: u64,
    /// Interval between status frame bursts [ms].
    pub status_period_ms: u64,
    /// Firmware command timeout [ms].
    pub command_timeout_ms: u64,
    /// Current drawn against a hard stop [A].
    pub stall_current_a: f64,
    /// Current drawn while moving freely [A].
    pub free_current_a: f64,
    /// Joint speed per amp in current mode [deg/s/A].
    pub amps_to_dps: f64,
    /// Joint speed at full duty [deg/s].
    pub max_speed_dps: f64,
    /// Limits applied to plain `SET_POS` commands.
    pub default_max_vel_dps: f64,
    pub default_max_accel_dps2: f64,
    pub voltage_in: f64,
    pub temp_fet_c: f64,
    pub temp_motor_c: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_deg: 30.0,
            hard_stop_min_deg: Some(0.0),
            hard_stop_max_deg: None,
            step_ms: 5,
            status_period_ms: 10,
            command_timeout_ms: 500,
            stall_current_a: 2.0,
            free_current_a: 0.05,
            amps_to_dps: 200.0,
            max_speed_dps: 720.0,
            default_max_vel_dps: 90.0,
            default_max_accel_dps2: 180.0,
            voltage_in: 24.0,
            temp_fet_c: 32.5,
            temp_motor_c: 30.0,
        }
    }
}

impl SimulationConfig {
    /// Read `[bus.driver_config.simulation]`, defaulting when absent.
    pub fn from_bus(bus: &BusConfig) -> Result<Self, TransportError> {
        let Some(table) = bus.driver_config.get(DRIVER_NAME) else {
            return Ok(Self::default());
        };
        let cfg: Self = table
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| TransportError::ConfigError(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.step_ms == 0 || self.status_period_ms == 0 || self.command_timeout_ms == 0 {
            return Err(TransportError::ConfigError(
                "step_ms, status_period_ms and command_timeout_ms must be > 0".to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (self.hard_stop_min_deg, self.hard_stop_max_deg) {
            if min >= max {
                return Err(TransportError::ConfigError(format!(
                    "hard_stop_min_deg {min} must be below hard_stop_max_deg {max}"
                )));
            }
        }
        if !(self.max_speed_dps > 0.0) {
            return Err(TransportError::ConfigError(
                "max_speed_dps must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn status_period(&self) -> Duration {
        Duration::from_millis(self.status_period_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}
