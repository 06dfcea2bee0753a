//! Periodic control loop.
//!
//! One dedicated thread ticks at the configured rate. Each tick walks every
//! axis in node-id order and sends a position command for each enabled one.
//! A failure on one axis is counted and logged, then the tick moves on.
//!
//! ## Pacing
//! `sleep = max(0, period − elapsed)` via [`Periodic`]; a late tick never
//! carries more than one period of drift into the next.
//!
//! ## Shutdown
//! [`ControlLoop::stop`] cancels the loop token (waking the sleeper) and waits
//! a bounded time for the thread to exit.

use crate::bus::CommandBus;
use crate::error::ControlError;
use crate::periodic::{CancelToken, Periodic};
use crate::state::axis::AxisRuntime;
use arm_common::axis::MotionLimits;
use arm_common::consts::{CONTROL_STOP_TIMEOUT_MS, MIN_CONTROL_PERIOD_US};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

// ─── Cycle Statistics ───────────────────────────────────────────────

/// Control loop timing and error counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleStats {
    /// Ticks executed.
    pub ticks: u64,
    /// Ticks whose body took longer than the period.
    pub overruns: u64,
    /// Longest tick body.
    pub max_tick: Duration,
    /// Per-axis send or encode failures.
    pub axis_errors: u64,
}

impl CycleStats {
    #[inline]
    pub fn record(&mut self, elapsed: Duration, period: Duration, errors: u64) {
        self.ticks += 1;
        self.axis_errors += errors;
        if elapsed > period {
            self.overruns += 1;
        }
        if elapsed > self.max_tick {
            self.max_tick = elapsed;
        }
    }
}

/// Loop period for `rate_hz`, never shorter than the enforced minimum.
pub fn control_period(rate_hz: f64) -> Duration {
    let min = Duration::from_micros(MIN_CONTROL_PERIOD_US);
    if !(rate_hz > 0.0) {
        return min;
    }
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .unwrap_or(min)
        .max(min)
}

// ─── Error Throttle ─────────────────────────────────────────────────

/// Limits repeated error logs to one per window.
#[derive(Debug)]
pub struct ErrorThrottle {
    window: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl ErrorThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            suppressed: 0,
        }
    }

    /// Returns the number of suppressed errors when this one should be logged.
    pub fn admit(&mut self, now: Instant) -> Option<u64> {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.window => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }
}

// ─── Cycle Body ─────────────────────────────────────────────────────

/// Send one position command per enabled axis. Returns the failure count.
pub fn send_axis_commands<'a>(
    axes: impl IntoIterator<Item = &'a AxisRuntime>,
    bus: &CommandBus,
    defaults: &MotionLimits,
    throttle: &mut ErrorThrottle,
) -> u64 {
    let mut errors = 0;
    for axis in axes {
        let result = match axis.command_frame(bus.codec(), defaults) {
            Ok(Some(frame)) => bus.send(&frame),
            Ok(None) => continue,
            Err(e) => Err(ControlError::from(e)),
        };
        if let Err(e) = result {
            errors += 1;
            if let Some(suppressed) = throttle.admit(Instant::now()) {
                if suppressed > 0 {
                    error!(
                        "Axis {} command failed: {} ({} similar errors suppressed)",
                        axis.node_id(),
                        e,
                        suppressed
                    );
                } else {
                    error!("Axis {} command failed: {}", axis.node_id(), e);
                }
            }
        }
    }
    errors
}

// ─── Loop Thread ────────────────────────────────────────────────────

/// Handle to a running control loop thread.
pub struct ControlLoop {
    stop: CancelToken,
    handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<CycleStats>>,
    period: Duration,
}

impl ControlLoop {
    /// Spawn the loop. `body` runs once per tick and returns its error count.
    pub fn spawn<F>(period: Duration, mut body: F) -> Result<Self, ControlError>
    where
        F: FnMut() -> u64 + Send + 'static,
    {
        let stop = CancelToken::new();
        let stats = Arc::new(Mutex::new(CycleStats::default()));
        let thread_stop = stop.clone();
        let thread_stats = Arc::clone(&stats);

        let handle = std::thread::Builder::new()
            .name("arm-control-loop".to_string())
            .spawn(move || {
                let mut pacer = Periodic::new(period);
                loop {
                    if thread_stop.is_cancelled() {
                        break;
                    }
                    let errors = body();
                    thread_stats.lock().record(pacer.elapsed(), period, errors);
                    if !pacer.wait(&thread_stop) {
                        break;
                    }
                }
                debug!("Control loop thread exiting");
            })
            .map_err(|e| ControlError::Spawn(format!("control loop: {e}")))?;

        info!("Control loop started: period {:?}", period);
        Ok(Self {
            stop,
            handle: Some(handle),
            stats,
            period,
        })
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> CycleStats {
        *self.stats.lock()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait up to the stop timeout. Idempotent.
    pub fn stop(&mut self) {
        self.stop.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + Duration::from_millis(CONTROL_STOP_TIMEOUT_MS);
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("Control loop thread panicked");
            }
        } else {
            warn!(
                "Control loop did not exit within {} ms; detaching",
                CONTROL_STOP_TIMEOUT_MS
            );
        }
        let stats = self.stats();
        info!(
            "Control loop stopped: {} ticks, {} overruns, max tick {:?}, {} axis errors",
            stats.ticks, stats.overruns, stats.max_tick, stats.axis_errors
        );
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
