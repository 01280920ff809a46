//! Clock source abstraction
//!
//! The pacer only needs a monotonic timestamp and a coarse sleep. Tests swap in
//! a clock that advances virtually so pacing can be checked without waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source with a coarse sleep
pub trait Clock {
    /// Current timestamp
    fn now(&self) -> Instant;

    /// Sleep for at least roughly `duration`; may overshoot by the OS scheduler granularity
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Virtual clock for headless pacing.
///
/// Time only moves when something sleeps, when [`ManualClock::advance`] is
/// called, or by `tick` on every [`Clock::now`] reading (so a busy-wait still
/// terminates). Clones share the same timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    elapsed_ns: Arc<AtomicU64>,
    tick_ns: u64,
}

impl ManualClock {
    /// Create a clock that advances by `tick` per reading
    pub fn new(tick: Duration) -> Self {
        ManualClock {
            origin: Instant::now(),
            elapsed_ns: Arc::new(AtomicU64::new(0)),
            tick_ns: tick.as_nanos() as u64,
        }
    }

    /// Move time forward, e.g. to stand in for work done during a frame
    pub fn advance(&self, duration: Duration) {
        self.elapsed_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let ns = self.elapsed_ns.fetch_add(self.tick_ns, Ordering::SeqCst) + self.tick_ns;
        self.origin + Duration::from_nanos(ns)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
