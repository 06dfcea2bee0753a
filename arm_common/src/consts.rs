//! Workspace-wide constants.
//!
//! Single source of truth for numeric defaults and protocol limits.
//! Imported by all crates: no duplication permitted.

use static_assertions::const_assert;

/// Highest node id addressable with 29-bit extended identifiers.
pub const MAX_NODE_ID_EXTENDED: u8 = 0xFF;

/// Highest node id addressable with 11-bit standard identifiers.
pub const MAX_NODE_ID_STANDARD: u8 = 0x1F;

/// Maximum CAN classic payload length in bytes.
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Default control loop rate [Hz].
pub const DEFAULT_CONTROL_RATE_HZ: f64 = 200.0;

/// Shortest control loop period the loop will run at [µs].
pub const MIN_CONTROL_PERIOD_US: u64 = 1_000;

/// Default axis velocity limit for position commands [deg/s].
pub const DEFAULT_MAX_VEL_DPS: f64 = 90.0;

/// Default axis acceleration limit for position commands [deg/s²].
pub const DEFAULT_MAX_ACCEL_DPS2: f64 = 180.0;

/// Default telemetry staleness window before an axis is declared offline [s].
pub const DEFAULT_OFFLINE_TIMEOUT_S: f64 = 0.5;

/// Default CAN bitrate [bit/s].
pub const DEFAULT_BITRATE: u32 = 500_000;

/// Default transport driver name.
pub const DEFAULT_DRIVER: &str = "simulation";

/// Upper bound on a single wait-for-telemetry step during homing [ms].
pub const TELEMETRY_WAIT_MS: u64 = 100;

/// Poll interval inside a wait-for-telemetry step [ms].
pub const TELEMETRY_POLL_MS: u64 = 5;

/// Settling pause after neutralising all axes at homing start [ms].
pub const HOMING_SETTLE_MS: u64 = 20;

/// Pause between stopping the homed axis and committing the zero offset [ms].
pub const ZERO_COMMIT_DELAY_MS: u64 = 10;

/// Pacing of the backoff phase loop [ms].
pub const BACKOFF_PACE_MS: u64 = 5;

/// Minimum estimated backoff travel time [s].
pub const BACKOFF_MIN_TRAVEL_S: f64 = 0.2;

/// Margin added to the estimated backoff travel time [s].
pub const BACKOFF_SETTLE_MARGIN_S: f64 = 1.0;

/// Upper bound (exclusive) on the homing backoff angle [deg].
pub const MAX_BACKOFF_DEG: f64 = 360.0;

/// Bounded wait for the control loop thread to exit on stop [ms].
pub const CONTROL_STOP_TIMEOUT_MS: u64 = 1_000;

const_assert!(MAX_NODE_ID_STANDARD < MAX_NODE_ID_EXTENDED);
const_assert!(MIN_CONTROL_PERIOD_US > 0);
const_assert!(TELEMETRY_POLL_MS < TELEMETRY_WAIT_MS);
