//! Unit helpers: angle wrapping, electrical ↔ joint speed conversion,
//! and gauge normalisation for status reporting.

use serde::{Deserialize, Serialize};

/// Wrap an angle into `[0, 360)`.
///
/// `rem_euclid` can return exactly `360.0` for tiny negative inputs,
/// which is folded back to `0.0`.
#[inline]
pub fn wrap_deg_0_360(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    if d >= 360.0 { 0.0 } else { d }
}

/// Shortest signed angular difference `to - from`, in `(-180, 180]`.
///
/// Non-finite inputs yield NaN.
#[inline]
pub fn shortest_delta_deg(from: f64, to: f64) -> f64 {
    let diff = (to - from).rem_euclid(360.0);
    if diff > 180.0 { diff - 360.0 } else { diff }
}

/// Motor geometry needed to move between the electrical and joint domains.
///
/// Both fields are validated `> 0` at configuration load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorGeometry {
    /// Motor pole-pair count.
    pub pole_pairs: f64,
    /// Mechanical reduction between motor shaft and joint output.
    pub reduction_ratio: f64,
}

impl MotorGeometry {
    /// Electrical RPM → joint output RPM.
    #[inline]
    pub fn joint_rpm(&self, erpm: f64) -> f64 {
        (erpm / self.pole_pairs) / self.reduction_ratio
    }

    /// Joint output RPM → electrical RPM.
    #[inline]
    pub fn erpm(&self, joint_rpm: f64) -> f64 {
        joint_rpm * self.reduction_ratio * self.pole_pairs
    }
}

/// Joint RPM → joint angular velocity [deg/s].
#[inline]
pub fn rpm_to_deg_per_s(rpm: f64) -> f64 {
    rpm * 6.0
}

/// Display range for a telemetry gauge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaugeRange {
    pub min: f64,
    pub max: f64,
}

impl GaugeRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Position of `value` within the range, clamped to `[0, 1]`.
    pub fn fraction(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range <= 0.0 || !value.is_finite() {
            return 0.0;
        }
        ((value - self.min) / range).clamp(0.0, 1.0)
    }
}
