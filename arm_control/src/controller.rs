//! Arm controller facade.
//!
//! Owns every [`AxisRuntime`], the telemetry store, the outbound command bus,
//! the homing gate and the control loop lifecycle. This is the command
//! boundary consumed by operator front-ends.
//!
//! ## Concurrency
//!
//! - The receive path writes telemetry only, via [`ArmController::on_receive`].
//! - The control loop thread reads runtimes and sends position commands for
//!   enabled axes.
//! - Homing runs on the caller's thread behind a single gate. It disables all
//!   axes for its duration, so the control loop idles without being paused.

use crate::bus::CommandBus;
use crate::command::homing::{self, HomingContext, HomingOutcome};
use crate::cycle::{self, ControlLoop, CycleStats, ErrorThrottle};
use crate::error::ControlError;
use crate::periodic::CancelToken;
use crate::state::axis::{AxisRuntime, AxisStatus};
use crate::state::telemetry::{AxisTelemetry, TelemetryStore};
use arm_common::axis::MotionLimits;
use arm_common::can::frame::CanFrame;
use arm_common::can::transport::{CanTransport, FrameHandler};
use arm_common::can::vesc::VescCodec;
use arm_common::config::ArmConfig;
use arm_common::homing::{HomingDefaults, HomingOverrides, secs};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// State shared with the control loop thread and the receive callback.
struct Shared {
    axes: BTreeMap<u8, AxisRuntime>,
    telemetry: TelemetryStore,
    bus: CommandBus,
    homing_gate: Mutex<()>,
    cancel: CancelToken,
    homing_snapshot: Mutex<Option<BTreeMap<u8, bool>>>,
    homing_defaults: HomingDefaults,
    motion_defaults: MotionLimits,
    period: Duration,
}

impl Shared {
    fn axis(&self, node_id: u8) -> Result<&AxisRuntime, ControlError> {
        self.axes.get(&node_id).ok_or(ControlError::UnknownAxis(node_id))
    }

    fn homing_context(&self) -> HomingContext<'_> {
        HomingContext {
            axes: &self.axes,
            telemetry: &self.telemetry,
            bus: &self.bus,
            cancel: &self.cancel,
            snapshot: &self.homing_snapshot,
            motion_defaults: self.motion_defaults,
        }
    }

    fn home_axis(
        &self,
        node_id: u8,
        overrides: Option<&HomingOverrides>,
        clear_cancel: bool,
    ) -> Result<HomingOutcome, ControlError> {
        let axis = self.axis(node_id)?;
        let params = axis.homing_params(overrides, &self.homing_defaults);
        params
            .validate()
            .map_err(|reason| ControlError::InvalidHoming {
                node_id,
                reason: reason.to_string(),
            })?;

        let _gate = self.homing_gate.lock();
        if clear_cancel {
            self.cancel.reset();
        }
        homing::run(&self.homing_context(), node_id, &params)
    }
}

/// Multi-axis arm controller.
pub struct ArmController {
    shared: Arc<Shared>,
    control: Mutex<Option<ControlLoop>>,
}

impl ArmController {
    /// Build runtimes for every configured axis. Axes start disabled.
    ///
    /// The transport must already be open; wire [`frame_handler`](Self::frame_handler)
    /// into it to feed telemetry.
    pub fn new(config: &ArmConfig, transport: Arc<dyn CanTransport>) -> Self {
        let telemetry = TelemetryStore::new(secs(config.bus.offline_timeout_s));
        let mut axes = BTreeMap::new();
        for axis in &config.axes {
            telemetry.set_geometry(axis.node_id, axis.geometry());
            axes.insert(axis.node_id, AxisRuntime::new(axis.clone()));
        }

        info!(
            "Arm controller: {} axes {:?}, {:?}, {} Hz",
            axes.len(),
            axes.keys().collect::<Vec<_>>(),
            config.bus.id_format,
            config.control.rate_hz
        );

        Self {
            shared: Arc::new(Shared {
                axes,
                telemetry,
                bus: CommandBus::new(VescCodec::new(config.bus.id_format), transport),
                homing_gate: Mutex::new(()),
                cancel: CancelToken::new(),
                homing_snapshot: Mutex::new(None),
                homing_defaults: config.homing.clone(),
                motion_defaults: config.control.motion_defaults(),
                period: cycle::control_period(config.control.rate_hz),
            }),
            control: Mutex::new(None),
        }
    }

    /// Configured node ids, ascending.
    pub fn node_ids(&self) -> Vec<u8> {
        self.shared.axes.keys().copied().collect()
    }

    // ─── Command boundary ───────────────────────────────────────────

    /// Store a new target angle. Clamping happens when the command is built.
    pub fn set_target(&self, node_id: u8, deg: f64) -> Result<(), ControlError> {
        let axis = self.shared.axis(node_id)?;
        if !deg.is_finite() {
            return Err(ControlError::InvalidTarget { node_id, value: deg });
        }
        axis.set_target_deg(deg);
        Ok(())
    }

    /// Enable or disable position commands for an axis.
    ///
    /// While homing is active the change is applied to the pre-homing
    /// snapshot and takes effect when homing ends.
    pub fn set_enabled(&self, node_id: u8, enabled: bool) -> Result<(), ControlError> {
        let axis = self.shared.axis(node_id)?;
        let mut snapshot = self.shared.homing_snapshot.lock();
        match snapshot.as_mut() {
            Some(saved) => {
                saved.insert(node_id, enabled);
                debug!("Axis {} enable={} deferred until homing ends", node_id, enabled);
            }
            None => axis.set_enabled(enabled),
        }
        Ok(())
    }

    pub fn apply_motion_limits(
        &self,
        node_id: u8,
        max_vel_dps: Option<f64>,
        max_accel_dps2: Option<f64>,
    ) -> Result<(), ControlError> {
        for (name, value) in [("max_vel_dps", max_vel_dps), ("max_accel_dps2", max_accel_dps2)] {
            if let Some(v) = value {
                if !(v > 0.0) || !v.is_finite() {
                    return Err(ControlError::InvalidLimits {
                        node_id,
                        reason: format!("{name} must be > 0, got {v}"),
                    });
                }
            }
        }
        self.shared
            .axis(node_id)?
            .apply_motion_limits(max_vel_dps, max_accel_dps2);
        Ok(())
    }

    /// Replace the axis-level homing overrides.
    pub fn apply_homing_overrides(
        &self,
        node_id: u8,
        overrides: HomingOverrides,
    ) -> Result<(), ControlError> {
        let axis = self.shared.axis(node_id)?;
        overrides
            .resolve(&self.shared.homing_defaults)
            .validate()
            .map_err(|reason| ControlError::InvalidHoming {
                node_id,
                reason: reason.to_string(),
            })?;
        axis.apply_homing_overrides(overrides);
        Ok(())
    }

    // ─── Control loop ───────────────────────────────────────────────

    /// Start the control loop. No-op if already running.
    pub fn start(&self) -> Result<(), ControlError> {
        let mut control = self.control.lock();
        if control.as_ref().is_some_and(|c| c.is_running()) {
            debug!("Control loop already running");
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        let mut throttle = ErrorThrottle::new(Duration::from_secs(1));
        *control = Some(ControlLoop::spawn(self.shared.period, move || {
            cycle::send_axis_commands(
                shared.axes.values(),
                &shared.bus,
                &shared.motion_defaults,
                &mut throttle,
            )
        })?);
        Ok(())
    }

    /// Stop the control loop and wait for it to exit. Idempotent.
    pub fn stop(&self) {
        if let Some(mut control) = self.control.lock().take() {
            control.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.control.lock().as_ref().is_some_and(|c| c.is_running())
    }

    /// Statistics of the running loop, if any.
    pub fn cycle_stats(&self) -> Option<CycleStats> {
        self.control.lock().as_ref().map(|c| c.stats())
    }

    // ─── Homing ─────────────────────────────────────────────────────

    /// Home one axis. Blocks until homing ends; serialised with every other
    /// homing call.
    ///
    /// Overrides resolve as call-site, then axis config, then global defaults.
    pub fn home_axis(
        &self,
        node_id: u8,
        overrides: Option<&HomingOverrides>,
    ) -> Result<HomingOutcome, ControlError> {
        self.shared.home_axis(node_id, overrides, true)
    }

    /// Home every axis in ascending node-id order.
    ///
    /// A failure on one axis is logged and the sweep continues; a cancel
    /// stops the sweep before the next axis.
    pub fn home_all(
        &self,
        overrides: Option<&HomingOverrides>,
    ) -> Vec<(u8, Result<HomingOutcome, ControlError>)> {
        self.shared.cancel.reset();
        let mut results = Vec::new();
        for node_id in self.node_ids() {
            if self.shared.cancel.is_cancelled() {
                warn!("Homing cancelled; stopping sweep before axis {}", node_id);
                break;
            }
            let result = self.shared.home_axis(node_id, overrides, false);
            if let Err(e) = &result {
                error!("Homing failed on axis {}: {}", node_id, e);
            }
            results.push((node_id, result));
        }
        results
    }

    /// Request cancellation and stop every axis immediately.
    ///
    /// Callable from any thread; does not wait for the homing gate.
    pub fn cancel_homing(&self) {
        self.shared.cancel.cancel();
        self.shared.bus.stop_all(self.shared.axes.keys().copied());
        info!("Homing cancel requested");
    }

    pub fn is_homing(&self) -> bool {
        self.shared.homing_snapshot.lock().is_some()
    }

    // ─── Telemetry ──────────────────────────────────────────────────

    /// Telemetry snapshot; offline axes are returned with `offline` set.
    pub fn get_telemetry(&self, node_id: u8) -> Option<AxisTelemetry> {
        self.shared.telemetry.get(node_id)
    }

    /// Telemetry snapshot, `None` if unknown or offline.
    pub fn get_online_telemetry(&self, node_id: u8) -> Option<AxisTelemetry> {
        self.shared.telemetry.get_online(node_id)
    }

    pub fn axis_status(&self, node_id: u8) -> Option<AxisStatus> {
        self.shared.axes.get(&node_id).map(|a| a.snapshot())
    }

    /// Feed one inbound frame into the telemetry store.
    pub fn on_receive(&self, frame: &CanFrame) {
        receive(&self.shared, frame);
    }

    /// Receive callback for [`CanTransport::set_receiver`].
    ///
    /// Holds a weak reference; frames arriving after the controller is
    /// dropped are ignored.
    pub fn frame_handler(&self) -> FrameHandler {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |frame: &CanFrame| {
            if let Some(shared) = weak.upgrade() {
                receive(&shared, frame);
            }
        })
    }
}

fn receive(shared: &Shared, frame: &CanFrame) {
    shared
        .telemetry
        .ingest(frame, shared.bus.codec().id_format);
}

impl Drop for ArmController {
    fn drop(&mut self) {
        self.stop();
    }
}
