//! Homing configuration types.
//!
//! Defines `HomingMode`, `HomingDirection`, the fully-populated
//! `HomingDefaults` (injected once at startup), the sparse `HomingOverrides`
//! carried per axis and per call, and the resolved `HomingParams` consumed by
//! the homing supervisor.
//!
//! Resolution is a pure "first non-empty value wins" merge:
//! call-site overrides → axis overrides → global defaults.

use crate::consts::MAX_BACKOFF_DEG;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Drive mode used to push the axis into its hard stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HomingMode {
    /// Velocity mode: constant joint RPM.
    #[default]
    Rpm,
    /// Current mode: constant motor current.
    Current,
}

/// Approach direction towards the mechanical zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HomingDirection {
    /// Approach in +direction.
    Positive,
    /// Approach in -direction.
    #[default]
    Negative,
}

impl HomingDirection {
    /// Returns the sign multiplier for the approach direction.
    #[inline]
    pub const fn sign(&self) -> f64 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

/// Drive command issued during the approach phase.
///
/// Tagged by mode so each case carries only its own setpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomingDrive {
    /// Joint RPM magnitude.
    Rpm { rpm: f64 },
    /// Motor current magnitude [A].
    Current { amps: f64 },
}

impl HomingDrive {
    pub fn mode(&self) -> HomingMode {
        match self {
            Self::Rpm { .. } => HomingMode::Rpm,
            Self::Current { .. } => HomingMode::Current,
        }
    }
}

/// Global default homing configuration (the `[homing]` table).
///
/// Every field is populated; per-axis and per-call overrides fall back here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomingDefaults {
    pub mode: HomingMode,
    pub move_direction: HomingDirection,
    /// Velocity-mode target [joint RPM].
    pub rpm: f64,
    /// Current-mode target [A].
    pub current_a: f64,
    /// `|I_motor| >= threshold` sustained for the dwell counts as a collision [A].
    pub current_threshold_a: f64,
    /// Debounce dwell [s].
    pub collision_dwell_s: f64,
    /// Approach phase timeout [s].
    pub timeout_s: f64,
    /// Backoff distance from the new zero [deg].
    pub backoff_deg: f64,
    /// Backoff helper speed [joint RPM].
    pub backoff_rpm: f64,
    /// Collision monitor sample period [s].
    pub sample_period_s: f64,
    /// Heartbeat (command re-send) period [s].
    pub command_period_s: f64,
    /// Keep disabled idle axes alive with zero-RPM frames.
    pub send_idle_keepalive: bool,
}

impl Default for HomingDefaults {
    fn default() -> Self {
        Self {
            mode: HomingMode::Rpm,
            move_direction: HomingDirection::Negative,
            rpm: 10.0,
            current_a: 0.10,
            current_threshold_a: 0.12,
            collision_dwell_s: 0.08,
            timeout_s: 8.0,
            backoff_deg: 5.0,
            backoff_rpm: 20.0,
            sample_period_s: 0.01,
            command_period_s: 0.05,
            send_idle_keepalive: true,
        }
    }
}

impl HomingDefaults {
    /// Validate the default set by resolving it with no overrides.
    pub fn validate(&self) -> Result<(), &'static str> {
        HomingOverrides::default().resolve(self).validate()
    }
}

/// Sparse homing overrides. `None` means "inherit".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomingOverrides {
    pub mode: Option<HomingMode>,
    pub move_direction: Option<HomingDirection>,
    pub rpm: Option<f64>,
    pub current_a: Option<f64>,
    pub current_threshold_a: Option<f64>,
    pub collision_dwell_s: Option<f64>,
    pub timeout_s: Option<f64>,
    pub backoff_deg: Option<f64>,
    pub backoff_rpm: Option<f64>,
    pub sample_period_s: Option<f64>,
    pub command_period_s: Option<f64>,
    pub send_idle_keepalive: Option<bool>,
}

impl HomingOverrides {
    /// Field-wise merge: values set on `self` win over `fallback`.
    pub fn or(&self, fallback: &HomingOverrides) -> HomingOverrides {
        HomingOverrides {
            mode: self.mode.or(fallback.mode),
            move_direction: self.move_direction.or(fallback.move_direction),
            rpm: self.rpm.or(fallback.rpm),
            current_a: self.current_a.or(fallback.current_a),
            current_threshold_a: self.current_threshold_a.or(fallback.current_threshold_a),
            collision_dwell_s: self.collision_dwell_s.or(fallback.collision_dwell_s),
            timeout_s: self.timeout_s.or(fallback.timeout_s),
            backoff_deg: self.backoff_deg.or(fallback.backoff_deg),
            backoff_rpm: self.backoff_rpm.or(fallback.backoff_rpm),
            sample_period_s: self.sample_period_s.or(fallback.sample_period_s),
            command_period_s: self.command_period_s.or(fallback.command_period_s),
            send_idle_keepalive: self.send_idle_keepalive.or(fallback.send_idle_keepalive),
        }
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == HomingOverrides::default()
    }

    /// Fill every unset field from `defaults`.
    pub fn resolve(&self, defaults: &HomingDefaults) -> HomingParams {
        let mode = self.mode.unwrap_or(defaults.mode);
        let drive = match mode {
            HomingMode::Rpm => HomingDrive::Rpm {
                rpm: self.rpm.unwrap_or(defaults.rpm).abs(),
            },
            HomingMode::Current => HomingDrive::Current {
                amps: self.current_a.unwrap_or(defaults.current_a).abs(),
            },
        };
        HomingParams {
            drive,
            direction: self.move_direction.unwrap_or(defaults.move_direction),
            current_threshold_a: self
                .current_threshold_a
                .unwrap_or(defaults.current_threshold_a),
            collision_dwell_s: self.collision_dwell_s.unwrap_or(defaults.collision_dwell_s),
            timeout_s: self.timeout_s.unwrap_or(defaults.timeout_s),
            backoff_deg: self.backoff_deg.unwrap_or(defaults.backoff_deg),
            backoff_rpm: self.backoff_rpm.unwrap_or(defaults.backoff_rpm),
            sample_period_s: self.sample_period_s.unwrap_or(defaults.sample_period_s),
            command_period_s: self.command_period_s.unwrap_or(defaults.command_period_s),
            send_idle_keepalive: self
                .send_idle_keepalive
                .unwrap_or(defaults.send_idle_keepalive),
        }
    }
}

/// Fully resolved homing parameters for one run on one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct HomingParams {
    pub drive: HomingDrive,
    pub direction: HomingDirection,
    pub current_threshold_a: f64,
    pub collision_dwell_s: f64,
    pub timeout_s: f64,
    pub backoff_deg: f64,
    pub backoff_rpm: f64,
    pub sample_period_s: f64,
    pub command_period_s: f64,
    pub send_idle_keepalive: bool,
}

impl HomingParams {
    pub fn validate(&self) -> Result<(), &'static str> {
        let setpoint = match self.drive {
            HomingDrive::Rpm { rpm } => rpm,
            HomingDrive::Current { amps } => amps,
        };
        if !setpoint.is_finite() {
            return Err("homing drive setpoint must be finite");
        }
        if !(self.current_threshold_a > 0.0) {
            return Err("current_threshold_a must be > 0");
        }
        if !(self.collision_dwell_s >= 0.0) {
            return Err("collision_dwell_s must be >= 0");
        }
        if !(self.timeout_s > 0.0) {
            return Err("timeout_s must be > 0");
        }
        if !(self.backoff_deg >= 0.0 && self.backoff_deg < MAX_BACKOFF_DEG) {
            return Err("backoff_deg must be >= 0 and < 360");
        }
        if !(self.sample_period_s > 0.0) || !(self.command_period_s > 0.0) {
            return Err("sample_period_s and command_period_s must be > 0");
        }
        Ok(())
    }

    /// Collision debounce dwell.
    pub fn dwell(&self) -> Duration {
        secs(self.collision_dwell_s)
    }

    /// Approach phase deadline, measured from drive start.
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_s)
    }

    /// Heartbeat period for command re-sends.
    pub fn heartbeat(&self) -> Duration {
        secs(self.command_period_s)
    }

    /// Monitor tick: the sample period, bounded by the heartbeat period.
    pub fn monitor_tick(&self) -> Duration {
        secs(self.sample_period_s.min(self.command_period_s))
    }

    /// Signed drive setpoint (direction applied).
    pub fn signed_setpoint(&self) -> f64 {
        let magnitude = match self.drive {
            HomingDrive::Rpm { rpm } => rpm,
            HomingDrive::Current { amps } => amps,
        };
        self.direction.sign() * magnitude
    }

    /// Backoff target relative to the new zero [deg].
    pub fn backoff_target_deg(&self) -> f64 {
        -self.direction.sign() * self.backoff_deg
    }
}

/// Seconds → `Duration`, saturating instead of panicking on out-of-range input.
pub fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(if s > 0.0 { Duration::MAX } else { Duration::ZERO })
}
