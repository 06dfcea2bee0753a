//! Configuration loading traits and types.
//!
//! All binaries in the workspace read a single TOML file into [`ArmConfig`]
//! through the blanket [`ConfigLoader`] trait.
//!
//! # Usage
//!
//! ```rust,no_run
//! use arm_common::config::{ArmConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = ArmConfig::load_validated(Path::new("config/arm.toml"))?;
//!     println!("{} axes on {}", config.axes.len(), config.bus.driver);
//!     Ok(())
//! }
//! ```

use crate::axis::{AxisConfig, MotionLimits};
use crate::can::frame::IdFormat;
use crate::consts::{
    DEFAULT_BITRATE, DEFAULT_CONTROL_RATE_HZ, DEFAULT_DRIVER, DEFAULT_MAX_ACCEL_DPS2,
    DEFAULT_MAX_VEL_DPS, DEFAULT_OFFLINE_TIMEOUT_S,
};
use crate::homing::HomingDefaults;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common fields shared across all applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "arm-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation: any deserializable struct can be loaded.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Bus ────────────────────────────────────────────────────────────

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

fn default_interface() -> String {
    "socketcan".to_string()
}

fn default_channel() -> String {
    "can0".to_string()
}

fn default_bitrate() -> u32 {
    DEFAULT_BITRATE
}

fn default_offline_timeout_s() -> f64 {
    DEFAULT_OFFLINE_TIMEOUT_S
}

/// CAN bus settings (the `[bus]` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Transport driver registry name.
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Interface kind passed to hardware drivers.
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// [bit/s]
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    #[serde(default)]
    pub id_format: IdFormat,
    /// Telemetry staleness window [s].
    #[serde(default = "default_offline_timeout_s")]
    pub offline_timeout_s: f64,
    /// Driver-specific tables, keyed by driver name.
    #[serde(default)]
    pub driver_config: HashMap<String, toml::Value>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            interface: default_interface(),
            channel: default_channel(),
            bitrate: default_bitrate(),
            id_format: IdFormat::default(),
            offline_timeout_s: default_offline_timeout_s(),
            driver_config: HashMap::new(),
        }
    }
}

// ─── Control loop ───────────────────────────────────────────────────

/// Control loop settings (the `[control]` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Loop rate [Hz].
    pub rate_hz: f64,
    /// Velocity limit for axes without their own [deg/s].
    pub default_max_vel_dps: f64,
    /// Acceleration limit for axes without their own [deg/s²].
    pub default_max_accel_dps2: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_CONTROL_RATE_HZ,
            default_max_vel_dps: DEFAULT_MAX_VEL_DPS,
            default_max_accel_dps2: DEFAULT_MAX_ACCEL_DPS2,
        }
    }
}

impl ControlConfig {
    pub fn motion_defaults(&self) -> MotionLimits {
        MotionLimits {
            max_vel_dps: self.default_max_vel_dps,
            max_accel_dps2: self.default_max_accel_dps2,
        }
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Root configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "arm"
///
/// [bus]
/// id_format = "extended_29bit"
///
/// [homing]
/// mode = "current"
///
/// [[axes]]
/// node_id = 1
/// reduction_ratio = 80.0
///
/// [axes.homing]
/// current_threshold_a = 0.55
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmConfig {
    pub shared: SharedConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub control: ControlConfig,
    /// Global homing defaults.
    #[serde(default)]
    pub homing: HomingDefaults,
    #[serde(default)]
    pub axes: Vec<AxisConfig>,
}

impl ArmConfig {
    /// Load and validate in one step.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `shared.service_name` non-empty
    /// 2. `control.rate_hz` and default motion limits `> 0`
    /// 3. `bus.offline_timeout_s > 0`
    /// 4. Homing defaults resolve to valid parameters
    /// 5. Node ids unique and addressable in `bus.id_format`
    /// 6. Each axis valid in isolation, including its homing overrides
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let control = &self.control;
        for (name, value) in [
            ("control.rate_hz", control.rate_hz),
            ("control.default_max_vel_dps", control.default_max_vel_dps),
            ("control.default_max_accel_dps2", control.default_max_accel_dps2),
            ("bus.offline_timeout_s", self.bus.offline_timeout_s),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be > 0, got {value}"
                )));
            }
        }

        self.homing
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("homing: {e}")))?;

        let max_node = self.bus.id_format.max_node_id();
        let mut seen = HashSet::new();
        for axis in &self.axes {
            if !seen.insert(axis.node_id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate node_id {}",
                    axis.node_id
                )));
            }
            if axis.node_id > max_node {
                return Err(ConfigError::ValidationError(format!(
                    "node_id {} exceeds {:?} range (max {})",
                    axis.node_id, self.bus.id_format, max_node
                )));
            }
            axis.validate().map_err(ConfigError::ValidationError)?;
            axis.homing.resolve(&self.homing).validate().map_err(|e| {
                ConfigError::ValidationError(format!("axis {} homing: {e}", axis.node_id))
            })?;
        }
        Ok(())
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.axes.iter().map(|a| a.node_id).collect();
        ids.sort_unstable();
        ids
    }
}
