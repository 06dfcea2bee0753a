//! Hard-stop homing supervision.
//!
//! Drives one axis into its mechanical stop, detects the collision from motor
//! current, commits the stop as the firmware zero, then backs off.
//!
//! ## Sequence
//!
//! | Phase   | Action                                                          |
//! |---------|-----------------------------------------------------------------|
//! | Settle  | Snapshot enables, disable every axis, zero current, brief pause |
//! | Drive   | RPM or current drive with heartbeat; debounce current vs threshold |
//! | Commit  | RPM 0, read position, PID offset update to 0°, stop, mark homed |
//! | Backoff | Position command to `−direction × backoff_deg` until settled    |
//!
//! Every exit path (success, timeout, cancel, error, panic) stops all axes
//! and restores the enable snapshot through [`EnableGuard`].
//!
//! Callers hold the homing gate for the duration of [`run`].

use crate::bus::CommandBus;
use crate::error::ControlError;
use crate::periodic::{CancelToken, Heartbeat, Periodic};
use crate::state::axis::AxisRuntime;
use crate::state::telemetry::TelemetryStore;
use arm_common::axis::MotionLimits;
use arm_common::consts::{
    BACKOFF_MIN_TRAVEL_S, BACKOFF_PACE_MS, BACKOFF_SETTLE_MARGIN_S, HOMING_SETTLE_MS,
    TELEMETRY_POLL_MS, TELEMETRY_WAIT_MS, ZERO_COMMIT_DELAY_MS,
};
use arm_common::homing::{HomingDrive, HomingParams, secs};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

// ─── Outcome ────────────────────────────────────────────────────────

/// Phase of the homing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    Settle,
    Drive,
    Commit,
    Backoff,
}

/// How a homing run ended. Errors are reported separately as `ControlError`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HomingOutcome {
    /// Collision confirmed and zero committed.
    Homed {
        /// Absolute position read at the stop [deg].
        zero_abs_deg: f64,
    },
    /// No collision before the deadline; motion stopped.
    TimedOut,
    /// Cancellation observed during `phase`.
    Cancelled { phase: HomingPhase },
}

impl HomingOutcome {
    #[inline]
    pub fn is_homed(&self) -> bool {
        matches!(self, Self::Homed { .. })
    }
}

// ─── Collision Debounce ─────────────────────────────────────────────

/// Over-threshold current debounce.
///
/// The first sample at or above the threshold starts the timer; a later
/// sample still above it once `dwell` has elapsed confirms the collision.
/// Any sample below the threshold resets the timer. Fires at most once.
#[derive(Debug, Clone)]
pub struct CollisionDetector {
    threshold_a: f64,
    dwell: Duration,
    over_since: Option<Instant>,
    fired: bool,
}

impl CollisionDetector {
    pub fn new(threshold_a: f64, dwell: Duration) -> Self {
        Self {
            threshold_a,
            dwell,
            over_since: None,
            fired: false,
        }
    }

    /// Feed one motor current sample. Returns `true` exactly once, on confirmation.
    pub fn update(&mut self, current_a: f64, now: Instant) -> bool {
        if self.fired {
            return false;
        }
        if current_a.abs() < self.threshold_a {
            self.over_since = None;
            return false;
        }
        match self.over_since {
            None => {
                self.over_since = Some(now);
                false
            }
            Some(since) if now.saturating_duration_since(since) >= self.dwell => {
                self.fired = true;
                true
            }
            Some(_) => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

// ─── Context ────────────────────────────────────────────────────────

/// Borrowed controller state needed by one homing run.
pub(crate) struct HomingContext<'a> {
    pub axes: &'a BTreeMap<u8, AxisRuntime>,
    pub telemetry: &'a TelemetryStore,
    pub bus: &'a CommandBus,
    pub cancel: &'a CancelToken,
    /// Pre-homing enable flags; `Some` while a run is active.
    pub snapshot: &'a Mutex<Option<BTreeMap<u8, bool>>>,
    pub motion_defaults: MotionLimits,
}

/// Disables every axis on creation; stops all axes and restores the snapshot on drop.
struct EnableGuard<'c, 'a> {
    ctx: &'c HomingContext<'a>,
}

impl<'c, 'a> EnableGuard<'c, 'a> {
    fn engage(ctx: &'c HomingContext<'a>) -> Self {
        let mut slot = ctx.snapshot.lock();
        let snapshot: BTreeMap<u8, bool> = ctx
            .axes
            .iter()
            .map(|(id, axis)| (*id, axis.is_enabled()))
            .collect();
        for axis in ctx.axes.values() {
            axis.set_enabled(false);
        }
        *slot = Some(snapshot);
        Self { ctx }
    }
}

impl Drop for EnableGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.bus.stop_all(self.ctx.axes.keys().copied());
        let mut slot = self.ctx.snapshot.lock();
        if let Some(snapshot) = slot.take() {
            for (id, enabled) in snapshot {
                if let Some(axis) = self.ctx.axes.get(&id) {
                    axis.set_enabled(enabled);
                }
            }
        }
        debug!("Homing cleanup: all axes stopped, enables restored");
    }
}

/// Heartbeat source for the axis being homed.
struct Drive<'c, 'a> {
    ctx: &'c HomingContext<'a>,
    axis: &'c AxisRuntime,
    drive: HomingDrive,
    setpoint: f64,
}

impl Drive<'_, '_> {
    fn send(&self) -> Result<(), ControlError> {
        let node_id = self.axis.node_id();
        match self.drive {
            HomingDrive::Rpm { .. } => {
                self.ctx
                    .bus
                    .set_joint_rpm(node_id, &self.axis.geometry(), self.setpoint)
            }
            HomingDrive::Current { .. } => self.ctx.bus.set_current(node_id, self.setpoint),
        }
    }

    /// Re-send on the heartbeat cadence. Failures are logged only.
    fn beat(&self, heartbeat: &mut Heartbeat, now: Instant) {
        if heartbeat.due(now) {
            if let Err(e) = self.send() {
                warn!("Axis {} homing heartbeat failed: {}", self.axis.node_id(), e);
            }
        }
    }
}

// ─── Sequence ───────────────────────────────────────────────────────

/// Run the full homing sequence for `node_id`.
///
/// `Err` is returned only for an unknown axis or a failed initial drive
/// command; cleanup has already run when this returns.
pub(crate) fn run(
    ctx: &HomingContext<'_>,
    node_id: u8,
    params: &HomingParams,
) -> Result<HomingOutcome, ControlError> {
    let axis = ctx.axes.get(&node_id).ok_or(ControlError::UnknownAxis(node_id))?;

    info!(
        "Axis {} homing start: {:?} {:?}, threshold {:.3} A, dwell {:.3} s, timeout {:.1} s",
        node_id,
        params.drive,
        params.direction,
        params.current_threshold_a,
        params.collision_dwell_s,
        params.timeout_s
    );

    let result = {
        let _guard = EnableGuard::engage(ctx);
        sequence(ctx, axis, params)
    };

    match &result {
        Ok(HomingOutcome::Homed { zero_abs_deg }) => {
            info!("Axis {} homed: zero at {:.2}° absolute", node_id, zero_abs_deg)
        }
        Ok(HomingOutcome::TimedOut) => {}
        Ok(HomingOutcome::Cancelled { phase }) => {
            warn!("Axis {} homing cancelled during {:?}", node_id, phase)
        }
        Err(e) => error!("Axis {} homing failed: {}", node_id, e),
    }
    result
}

fn sequence(
    ctx: &HomingContext<'_>,
    axis: &AxisRuntime,
    params: &HomingParams,
) -> Result<HomingOutcome, ControlError> {
    ctx.bus.stop_all(ctx.axes.keys().copied());
    if ctx
        .cancel
        .wait_timeout(Duration::from_millis(HOMING_SETTLE_MS))
    {
        return Ok(HomingOutcome::Cancelled {
            phase: HomingPhase::Settle,
        });
    }

    let drive = Drive {
        ctx,
        axis,
        drive: params.drive,
        setpoint: params.signed_setpoint(),
    };
    drive.send()?;

    if !drive_to_stop(ctx, &drive, params) {
        return Ok(if ctx.cancel.is_cancelled() {
            HomingOutcome::Cancelled {
                phase: HomingPhase::Drive,
            }
        } else {
            HomingOutcome::TimedOut
        });
    }

    let zero_abs_deg = commit_zero(ctx, axis);
    if ctx.cancel.is_cancelled() {
        return Ok(HomingOutcome::Cancelled {
            phase: HomingPhase::Commit,
        });
    }

    if !back_off(ctx, axis, params) {
        return Ok(HomingOutcome::Cancelled {
            phase: HomingPhase::Backoff,
        });
    }
    Ok(HomingOutcome::Homed { zero_abs_deg })
}

/// Monitor loop. Returns `true` on confirmed collision, `false` on cancel or
/// timeout (motion already stopped).
fn drive_to_stop(ctx: &HomingContext<'_>, drive: &Drive<'_, '_>, params: &HomingParams) -> bool {
    let node_id = drive.axis.node_id();
    let start = Instant::now();
    let timeout = params.timeout();
    let mut heartbeat = Heartbeat::new(params.heartbeat());
    heartbeat.mark(start);
    let mut idle = Heartbeat::new(params.heartbeat());
    let mut detector = CollisionDetector::new(params.current_threshold_a, params.dwell());
    let mut pacer = Periodic::new(params.monitor_tick());

    loop {
        if ctx.cancel.is_cancelled() {
            stop_axis(ctx, node_id);
            return false;
        }

        let now = Instant::now();
        drive.beat(&mut heartbeat, now);
        if params.send_idle_keepalive && idle.due(now) {
            keep_idle_axes_alive(ctx, node_id);
        }

        if now.saturating_duration_since(start) > timeout {
            warn!(
                "Axis {} homing timed out after {:.1} s without collision; stopping",
                node_id, params.timeout_s
            );
            stop_axis(ctx, node_id);
            return false;
        }

        match wait_for_current(ctx, drive, &mut heartbeat) {
            Sample::Cancelled => continue,
            Sample::Missing => {}
            Sample::Current(amps) => {
                if detector.update(amps, Instant::now()) {
                    info!(
                        "Axis {} collision: {:.3} A held for {:.3} s",
                        node_id, amps, params.collision_dwell_s
                    );
                    return true;
                }
            }
        }

        // Cancellation is handled at the top of the loop.
        pacer.wait(ctx.cancel);
    }
}

enum Sample {
    Current(f64),
    Missing,
    Cancelled,
}

/// Poll for motor current for up to the telemetry wait, keeping the drive
/// command alive meanwhile.
fn wait_for_current(
    ctx: &HomingContext<'_>,
    drive: &Drive<'_, '_>,
    heartbeat: &mut Heartbeat,
) -> Sample {
    let node_id = drive.axis.node_id();
    let deadline = Instant::now() + Duration::from_millis(TELEMETRY_WAIT_MS);
    loop {
        if let Some(amps) = ctx
            .telemetry
            .get_online(node_id)
            .and_then(|t| t.current_motor)
        {
            return Sample::Current(amps);
        }
        let now = Instant::now();
        if now >= deadline {
            debug!("Axis {} homing: no current telemetry", node_id);
            return Sample::Missing;
        }
        drive.beat(heartbeat, now);
        if ctx
            .cancel
            .wait_timeout(Duration::from_millis(TELEMETRY_POLL_MS))
        {
            return Sample::Cancelled;
        }
    }
}

/// Commit the stop position as firmware zero. Returns the absolute position read.
fn commit_zero(ctx: &HomingContext<'_>, axis: &AxisRuntime) -> f64 {
    let node_id = axis.node_id();
    if let Err(e) = ctx.bus.set_joint_rpm(node_id, &axis.geometry(), 0.0) {
        warn!("Axis {} halt before zero commit failed: {}", node_id, e);
    }
    let pos_now = ctx
        .telemetry
        .get_online(node_id)
        .and_then(|t| t.pos_deg)
        .unwrap_or(0.0);

    std::thread::sleep(Duration::from_millis(ZERO_COMMIT_DELAY_MS));
    match ctx.bus.update_pid_pos_offset(node_id, 0.0) {
        Ok(()) => info!(
            "Axis {} zero committed: {:.2}° now reads 0° on the controller",
            node_id, pos_now
        ),
        Err(e) => error!("Axis {} zero commit failed: {}", node_id, e),
    }
    stop_axis(ctx, node_id);
    axis.apply_zero(pos_now);
    pos_now
}

/// Hold a position command at the backoff target until the move has had time
/// to settle. Returns `false` if cancelled.
fn back_off(ctx: &HomingContext<'_>, axis: &AxisRuntime, params: &HomingParams) -> bool {
    let node_id = axis.node_id();
    let target_deg = params.backoff_target_deg();
    let max_vel = axis.motion_limits(&ctx.motion_defaults).max_vel_dps.max(1e-6);
    let travel_s = (params.backoff_deg / max_vel).max(BACKOFF_MIN_TRAVEL_S) + BACKOFF_SETTLE_MARGIN_S;
    let started = Instant::now();
    let deadline = started
        .checked_add(secs(travel_s))
        .unwrap_or(started + Duration::from_secs_f64(BACKOFF_MIN_TRAVEL_S + BACKOFF_SETTLE_MARGIN_S));

    info!("Axis {} backing off to {:.2}°", node_id, target_deg);

    let mut heartbeat = Heartbeat::new(params.heartbeat());
    let mut idle = Heartbeat::new(params.heartbeat());
    let mut pacer = Periodic::new(Duration::from_millis(BACKOFF_PACE_MS));

    while Instant::now() < deadline {
        if ctx.cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if heartbeat.due(now) {
            let sent = axis
                .position_frame(target_deg, ctx.bus.codec(), &ctx.motion_defaults)
                .map_err(ControlError::from)
                .and_then(|frame| ctx.bus.send(&frame));
            if let Err(e) = sent {
                warn!("Axis {} backoff command failed: {}", node_id, e);
            }
        }
        if params.send_idle_keepalive && idle.due(now) {
            keep_idle_axes_alive(ctx, node_id);
        }
        if !pacer.wait(ctx.cancel) {
            return false;
        }
    }
    true
}

/// Zero-current heartbeat to every other disabled axis.
fn keep_idle_axes_alive(ctx: &HomingContext<'_>, homing_node: u8) {
    for (id, axis) in ctx.axes {
        if *id == homing_node || axis.is_enabled() {
            continue;
        }
        if let Err(e) = ctx.bus.set_current(*id, 0.0) {
            debug!("Axis {} idle keepalive failed: {}", id, e);
        }
    }
}

fn stop_axis(ctx: &HomingContext<'_>, node_id: u8) {
    if let Err(e) = ctx.bus.stop_motion(node_id) {
        warn!("Axis {} stop failed: {}", node_id, e);
    }
}
