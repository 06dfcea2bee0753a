//! Per-axis configuration (`[[axes]]` tables).

use crate::consts::{DEFAULT_MAX_ACCEL_DPS2, DEFAULT_MAX_VEL_DPS};
use crate::homing::HomingOverrides;
use crate::units::MotorGeometry;
use serde::{Deserialize, Serialize};

fn default_soft_max_deg() -> f64 {
    359.999
}

fn default_reduction_ratio() -> f64 {
    100.0
}

fn default_pole_pairs() -> f64 {
    3.0
}

/// Static configuration of one joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// CAN node id of the axis controller.
    pub node_id: u8,
    /// Lower soft limit [deg].
    #[serde(default)]
    pub soft_min_deg: f64,
    /// Upper soft limit [deg].
    #[serde(default = "default_soft_max_deg")]
    pub soft_max_deg: f64,
    /// Trapezoid velocity limit; falls back to the global default when unset [deg/s].
    #[serde(default)]
    pub max_vel_dps: Option<f64>,
    /// Trapezoid acceleration limit; falls back to the global default when unset [deg/s²].
    #[serde(default)]
    pub max_accel_dps2: Option<f64>,
    /// Gear reduction between motor and joint.
    #[serde(default = "default_reduction_ratio")]
    pub reduction_ratio: f64,
    /// Motor pole-pair count.
    #[serde(default = "default_pole_pairs")]
    pub motor_pole_pairs: f64,
    /// Per-axis homing overrides.
    #[serde(default)]
    pub homing: HomingOverrides,
}

impl AxisConfig {
    /// Axis with every optional field at its default.
    pub fn new(node_id: u8) -> Self {
        Self {
            node_id,
            soft_min_deg: 0.0,
            soft_max_deg: default_soft_max_deg(),
            max_vel_dps: None,
            max_accel_dps2: None,
            reduction_ratio: default_reduction_ratio(),
            motor_pole_pairs: default_pole_pairs(),
            homing: HomingOverrides::default(),
        }
    }

    pub fn geometry(&self) -> MotorGeometry {
        MotorGeometry {
            pole_pairs: self.motor_pole_pairs,
            reduction_ratio: self.reduction_ratio,
        }
    }

    /// Effective limits after falling back to `defaults`.
    pub fn motion_limits(&self, defaults: &MotionLimits) -> MotionLimits {
        MotionLimits {
            max_vel_dps: self.max_vel_dps.unwrap_or(defaults.max_vel_dps),
            max_accel_dps2: self.max_accel_dps2.unwrap_or(defaults.max_accel_dps2),
        }
    }

    /// Clamp a target into the soft limits.
    #[inline]
    pub fn clamp_to_soft_limits(&self, target_deg: f64) -> f64 {
        target_deg.clamp(self.soft_min_deg, self.soft_max_deg)
    }

    /// Validate the axis in isolation.
    ///
    /// # Validation Rules
    /// 1. `soft_min_deg < soft_max_deg`, both finite
    /// 2. pole pairs and reduction ratio `> 0`
    /// 3. velocity/acceleration limits, when set, `> 0`
    pub fn validate(&self) -> Result<(), String> {
        if !self.soft_min_deg.is_finite()
            || !self.soft_max_deg.is_finite()
            || self.soft_min_deg >= self.soft_max_deg
        {
            return Err(format!(
                "axis {}: soft limits [{}, {}] are invalid",
                self.node_id, self.soft_min_deg, self.soft_max_deg
            ));
        }
        if !(self.motor_pole_pairs > 0.0) || !(self.reduction_ratio > 0.0) {
            return Err(format!(
                "axis {}: motor_pole_pairs and reduction_ratio must be > 0",
                self.node_id
            ));
        }
        for (name, value) in [
            ("max_vel_dps", self.max_vel_dps),
            ("max_accel_dps2", self.max_accel_dps2),
        ] {
            if let Some(v) = value {
                if !(v > 0.0) || !v.is_finite() {
                    return Err(format!("axis {}: {name} must be > 0", self.node_id));
                }
            }
        }
        Ok(())
    }
}

/// Trapezoid limits sent with every position command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionLimits {
    /// [deg/s]
    pub max_vel_dps: f64,
    /// [deg/s²]
    pub max_accel_dps2: f64,
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            max_vel_dps: DEFAULT_MAX_VEL_DPS,
            max_accel_dps2: DEFAULT_MAX_ACCEL_DPS2,
        }
    }
}
