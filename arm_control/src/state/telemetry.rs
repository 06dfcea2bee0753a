//! Per-axis telemetry tracking.
//!
//! The receive path is the only writer. Each successful decode updates the
//! addressed axis, marks it online and refreshes its timestamp. A liveness
//! sweep resets axes that have been silent longer than the offline timeout.
//!
//! ## Offline invariant
//!
//! `offline == true` implies every optional field is `None`. The reset is
//! idempotent: already-offline axes are left untouched.

use arm_common::can::frame::{CanFrame, IdFormat};
use arm_common::can::vesc::{CodecError, Telemetry, decode_telemetry};
use arm_common::units::{MotorGeometry, rpm_to_deg_per_s, shortest_delta_deg};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Last known state of one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisTelemetry {
    pub node_id: u8,
    /// Controller FET temperature [°C].
    pub temp_fet: Option<f64>,
    /// Motor temperature [°C].
    pub temp_motor: Option<f64>,
    /// [V]
    pub voltage_in: Option<f64>,
    /// [A]
    pub current_motor: Option<f64>,
    /// [A]
    pub current_in: Option<f64>,
    /// Joint speed [RPM]; unset when the node has no geometry.
    pub rpm: Option<f64>,
    /// Joint speed [deg/s]; unset when the node has no geometry.
    pub deg_per_s: Option<f64>,
    pub duty: Option<f64>,
    /// Firmware absolute position, `[0, 360)` [deg].
    pub pos_deg: Option<f64>,
    /// Continuous position in turns. Survives offline resets.
    pub pos_unwrapped_turns: f64,
    pub last_update: Instant,
    pub offline: bool,
    unwrap_ref_deg: Option<f64>,
}

impl AxisTelemetry {
    fn new(node_id: u8, now: Instant) -> Self {
        Self {
            node_id,
            temp_fet: None,
            temp_motor: None,
            voltage_in: None,
            current_motor: None,
            current_in: None,
            rpm: None,
            deg_per_s: None,
            duty: None,
            pos_deg: None,
            pos_unwrapped_turns: 0.0,
            last_update: now,
            offline: true,
            unwrap_ref_deg: None,
        }
    }

    fn apply(&mut self, update: &Telemetry, geometry: Option<&MotorGeometry>) {
        match *update {
            Telemetry::Status {
                erpm,
                current_motor,
                duty,
            } => {
                self.current_motor = Some(current_motor);
                self.duty = Some(duty);
                match geometry {
                    Some(g) => {
                        let rpm = g.joint_rpm(erpm as f64);
                        self.rpm = Some(rpm);
                        self.deg_per_s = Some(rpm_to_deg_per_s(rpm));
                    }
                    None => trace!("Node {}: no geometry, rpm left unset", self.node_id),
                }
            }
            Telemetry::Status4 {
                temp_fet,
                temp_motor,
                current_in,
                pos_deg,
            } => {
                self.temp_fet = Some(temp_fet);
                self.temp_motor = Some(temp_motor);
                self.current_in = Some(current_in);
                self.pos_deg = Some(pos_deg);
                self.unwrap(pos_deg);
            }
            Telemetry::Status5 { voltage_in } => self.voltage_in = Some(voltage_in),
            Telemetry::Status6 => {}
        }
    }

    fn unwrap(&mut self, pos_deg: f64) {
        match self.unwrap_ref_deg {
            None => self.pos_unwrapped_turns = pos_deg / 360.0,
            Some(prev) => self.pos_unwrapped_turns += shortest_delta_deg(prev, pos_deg) / 360.0,
        }
        self.unwrap_ref_deg = Some(pos_deg);
    }

    fn mark_online(&mut self, now: Instant) {
        self.last_update = now;
        if self.offline {
            self.offline = false;
            info!("Node {} online", self.node_id);
        }
    }

    fn reset_offline(&mut self) {
        if self.offline {
            return;
        }
        self.temp_fet = None;
        self.temp_motor = None;
        self.voltage_in = None;
        self.current_motor = None;
        self.current_in = None;
        self.rpm = None;
        self.deg_per_s = None;
        self.duty = None;
        self.pos_deg = None;
        self.offline = true;
        warn!("Node {} offline: telemetry reset", self.node_id);
    }
}

/// Telemetry for every node seen on the bus.
pub struct TelemetryStore {
    offline_timeout: Duration,
    geometries: RwLock<HashMap<u8, MotorGeometry>>,
    axes: RwLock<BTreeMap<u8, AxisTelemetry>>,
}

impl TelemetryStore {
    pub fn new(offline_timeout: Duration) -> Self {
        Self {
            offline_timeout,
            geometries: RwLock::new(HashMap::new()),
            axes: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn offline_timeout(&self) -> Duration {
        self.offline_timeout
    }

    /// Associate a node with the geometry used for RPM conversion.
    pub fn set_geometry(&self, node_id: u8, geometry: MotorGeometry) {
        self.geometries.write().insert(node_id, geometry);
    }

    /// Unpack and record a raw frame. Foreign frames are ignored silently.
    pub fn ingest(&self, frame: &CanFrame, id_format: IdFormat) -> bool {
        match id_format.unpack(frame.id, frame.extended) {
            Some((command, node_id)) => self.record(command, node_id, frame.payload()),
            None => false,
        }
    }

    pub fn record(&self, command: u8, node_id: u8, payload: &[u8]) -> bool {
        self.record_at(command, node_id, payload, Instant::now())
    }

    /// Decode and apply one status payload received at `now`.
    ///
    /// Returns `true` if the payload decoded. Failures drop the frame and
    /// leave state untouched.
    pub fn record_at(&self, command: u8, node_id: u8, payload: &[u8], now: Instant) -> bool {
        let update = match decode_telemetry(command, payload) {
            Ok(update) => update,
            Err(CodecError::UnsupportedCommand(id)) => {
                debug!("Node {}: ignoring command id {}", node_id, id);
                return false;
            }
            Err(e) => {
                warn!("Node {}: dropping malformed telemetry: {}", node_id, e);
                return false;
            }
        };

        let geometry = self.geometries.read().get(&node_id).copied();
        {
            let mut axes = self.axes.write();
            let axis = axes
                .entry(node_id)
                .or_insert_with(|| AxisTelemetry::new(node_id, now));
            axis.apply(&update, geometry.as_ref());
            axis.mark_online(now);
        }
        self.sweep_at(now);
        true
    }

    /// Snapshot after a liveness sweep; offline axes are returned with the flag set.
    pub fn get(&self, node_id: u8) -> Option<AxisTelemetry> {
        self.get_at(node_id, Instant::now())
    }

    pub fn get_at(&self, node_id: u8, now: Instant) -> Option<AxisTelemetry> {
        self.sweep_at(now);
        self.axes.read().get(&node_id).cloned()
    }

    /// Snapshot, or `None` if the node is unknown or offline.
    pub fn get_online(&self, node_id: u8) -> Option<AxisTelemetry> {
        self.get(node_id).filter(|t| !t.offline)
    }

    /// Reset every axis silent for longer than the offline timeout.
    pub fn sweep_at(&self, now: Instant) {
        let timeout = self.offline_timeout;
        let stale = |t: &AxisTelemetry| {
            !t.offline && now.saturating_duration_since(t.last_update) > timeout
        };
        if !self.axes.read().values().any(stale) {
            return;
        }
        for axis in self.axes.write().values_mut() {
            if stale(axis) {
                axis.reset_offline();
            }
        }
    }

    /// Node ids seen so far, ascending.
    pub fn node_ids(&self) -> Vec<u8> {
        self.axes.read().keys().copied().collect()
    }
}
