//! Control-facing runtime state of one axis.
//!
//! Each field is individually synchronised; there are no multi-field
//! transactions. `enabled` and `target_deg` belong to the command boundary,
//! `zero_offset_deg` and `homed` to the homing supervisor.

use arm_common::axis::{AxisConfig, MotionLimits};
use arm_common::can::frame::CanFrame;
use arm_common::can::vesc::{CodecError, VescCodec};
use arm_common::homing::{HomingDefaults, HomingOverrides, HomingParams};
use arm_common::units::MotorGeometry;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};

/// Read-only view of an axis runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisStatus {
    pub node_id: u8,
    pub enabled: bool,
    /// Last commanded angle, unclamped [deg].
    pub target_deg: f64,
    /// Absolute angle recorded as mechanical zero [deg].
    pub zero_offset_deg: f64,
    pub homed: bool,
}

/// Runtime state of one joint.
#[derive(Debug)]
pub struct AxisRuntime {
    node_id: u8,
    config: RwLock<AxisConfig>,
    enabled: AtomicBool,
    target_deg: Mutex<f64>,
    zero_offset_deg: Mutex<f64>,
    homed: AtomicBool,
}

impl AxisRuntime {
    /// Disabled, unhomed, targeting 0°.
    pub fn new(config: AxisConfig) -> Self {
        Self {
            node_id: config.node_id,
            config: RwLock::new(config),
            enabled: AtomicBool::new(false),
            target_deg: Mutex::new(0.0),
            zero_offset_deg: Mutex::new(0.0),
            homed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn config(&self) -> AxisConfig {
        self.config.read().clone()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn target_deg(&self) -> f64 {
        *self.target_deg.lock()
    }

    pub fn set_target_deg(&self, deg: f64) {
        *self.target_deg.lock() = deg;
    }

    pub fn zero_offset_deg(&self) -> f64 {
        *self.zero_offset_deg.lock()
    }

    #[inline]
    pub fn is_homed(&self) -> bool {
        self.homed.load(Ordering::Acquire)
    }

    pub fn geometry(&self) -> MotorGeometry {
        self.config.read().geometry()
    }

    pub fn motion_limits(&self, defaults: &MotionLimits) -> MotionLimits {
        self.config.read().motion_limits(defaults)
    }

    /// Position-with-limits frame for `target_deg`, clamped to the soft limits.
    ///
    /// Returns `Ok(None)` while disabled: the caller sends nothing.
    pub fn compute_command(
        &self,
        target_deg: f64,
        codec: &VescCodec,
        defaults: &MotionLimits,
    ) -> Result<Option<CanFrame>, CodecError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let (clamped, limits) = {
            let config = self.config.read();
            (
                config.clamp_to_soft_limits(target_deg),
                config.motion_limits(defaults),
            )
        };
        codec
            .set_pos_with_limits(self.node_id, clamped, limits.max_vel_dps, limits.max_accel_dps2)
            .map(Some)
    }

    /// Control loop entry: command the stored target.
    pub fn command_frame(
        &self,
        codec: &VescCodec,
        defaults: &MotionLimits,
    ) -> Result<Option<CanFrame>, CodecError> {
        self.compute_command(self.target_deg(), codec, defaults)
    }

    /// Position-with-limits frame ignoring enablement and soft limits.
    ///
    /// Used by homing backoff, which targets angles relative to a fresh zero.
    pub fn position_frame(
        &self,
        target_deg: f64,
        codec: &VescCodec,
        defaults: &MotionLimits,
    ) -> Result<CanFrame, CodecError> {
        let limits = self.motion_limits(defaults);
        codec.set_pos_with_limits(self.node_id, target_deg, limits.max_vel_dps, limits.max_accel_dps2)
    }

    /// Record `absolute_deg` as mechanical zero and mark the axis homed.
    pub fn apply_zero(&self, absolute_deg: f64) {
        *self.zero_offset_deg.lock() = absolute_deg;
        self.homed.store(true, Ordering::Release);
    }

    /// Replace the per-axis trapezoid limits. `None` falls back to the global default.
    pub fn apply_motion_limits(&self, max_vel_dps: Option<f64>, max_accel_dps2: Option<f64>) {
        let mut config = self.config.write();
        config.max_vel_dps = max_vel_dps;
        config.max_accel_dps2 = max_accel_dps2;
    }

    pub fn apply_homing_overrides(&self, overrides: HomingOverrides) {
        self.config.write().homing = overrides;
    }

    /// Resolve homing parameters: call-site overrides, then axis overrides,
    /// then global defaults.
    pub fn homing_params(
        &self,
        call: Option<&HomingOverrides>,
        defaults: &HomingDefaults,
    ) -> HomingParams {
        let config = self.config.read();
        match call {
            Some(call) => call.or(&config.homing).resolve(defaults),
            None => config.homing.resolve(defaults),
        }
    }

    pub fn snapshot(&self) -> AxisStatus {
        AxisStatus {
            node_id: self.node_id,
            enabled: self.is_enabled(),
            target_deg: self.target_deg(),
            zero_offset_deg: self.zero_offset_deg(),
            homed: self.is_homed(),
        }
    }
}
