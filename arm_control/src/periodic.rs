//! Periodic pacing with cooperative cancellation.
//!
//! [`Periodic`] is shared by the control loop, the homing monitor and the
//! backoff pacer. Every suspension goes through [`CancelToken::wait_timeout`],
//! so a cancel wakes sleepers immediately instead of after the period.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Resettable, clonable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake every waiter.
    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub fn reset(&self) {
        *self.inner.0.lock() = false;
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for up to `timeout`. Returns `true` if cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut cancelled = flag.lock();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*cancelled {
                cvar.wait(&mut cancelled);
            }
            return true;
        };
        while !*cancelled {
            if cvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

/// Fixed-rate pacer: sleep = max(0, period − elapsed since tick start).
///
/// A slow tick shortens the following sleep to zero; lateness never
/// accumulates beyond one period.
#[derive(Debug)]
pub struct Periodic {
    period: Duration,
    tick_start: Instant,
}

impl Periodic {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            tick_start: Instant::now(),
        }
    }

    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time spent in the current tick so far.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.tick_start.elapsed()
    }

    /// Sleep out the rest of the tick and start the next one.
    ///
    /// Returns `false` if `cancel` fired.
    pub fn wait(&mut self, cancel: &CancelToken) -> bool {
        let remaining = self.period.saturating_sub(self.tick_start.elapsed());
        let cancelled = if remaining.is_zero() {
            cancel.is_cancelled()
        } else {
            cancel.wait_timeout(remaining)
        };
        self.tick_start = Instant::now();
        !cancelled
    }
}

/// Re-send cadence tracker.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    period: Duration,
    last: Option<Instant>,
}

impl Heartbeat {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// True (and re-armed) when a period has passed since the last beat.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Record a beat sent outside of [`due`](Self::due).
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}
