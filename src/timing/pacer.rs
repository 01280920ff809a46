//! Fixed-cadence frame pacing
//!
//! OS sleeps are coarse and may overshoot, so the pacer sleeps only while more
//! than `spin_threshold` of the frame remains and busy-waits the rest. The next
//! frame is measured from the instant the wait ended, so a late frame does not
//! shift every following frame.

use super::clock::{Clock, SystemClock};
use std::time::{Duration, Instant};

/// Remaining time below which the pacer spins instead of sleeping
pub const DEFAULT_SPIN_THRESHOLD: Duration = Duration::from_micros(1100);

/// Holds the simulation loop to a fixed frame period
#[derive(Debug)]
pub struct FramePacer<C: Clock = SystemClock> {
    clock: C,
    frame_start: Instant,
    target: Duration,
    spin_threshold: Duration,
    last_frame_time: Duration,
}

impl FramePacer<SystemClock> {
    /// Pacer on the wall clock with the default spin threshold
    pub fn with_system_clock(target_hz: f64) -> Self {
        FramePacer::new(SystemClock, target_hz, DEFAULT_SPIN_THRESHOLD)
    }
}

impl<C: Clock> FramePacer<C> {
    /// Create a pacer for `target_hz` frames per second; the first frame starts now.
    ///
    /// # Panics
    ///
    /// Panics if `target_hz` is not a positive finite number.
    pub fn new(clock: C, target_hz: f64, spin_threshold: Duration) -> Self {
        assert!(
            target_hz.is_finite() && target_hz > 0.0,
            "frame rate must be positive, got {target_hz}"
        );
        let target = Duration::from_secs_f64(1.0 / target_hz);
        let frame_start = clock.now();
        FramePacer {
            clock,
            frame_start,
            target,
            spin_threshold,
            last_frame_time: Duration::ZERO,
        }
    }

    /// Target frame period
    pub fn target(&self) -> Duration {
        self.target
    }

    /// When the current frame started
    pub fn frame_start(&self) -> Instant {
        self.frame_start
    }

    /// Measured duration of the last completed frame
    pub fn last_frame_time(&self) -> Duration {
        self.last_frame_time
    }

    /// Block until the target period has elapsed since the frame started.
    pub fn pace(&mut self) {
        loop {
            let elapsed = self.clock.now().saturating_duration_since(self.frame_start);
            if elapsed >= self.target {
                break;
            }
            let remaining = self.target - elapsed;
            if remaining > self.spin_threshold {
                self.clock.sleep(remaining - self.spin_threshold);
            } else {
                std::hint::spin_loop();
            }
        }

        let frame_end = self.clock.now();
        self.last_frame_time = frame_end.saturating_duration_since(self.frame_start);
        self.frame_start = frame_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::clock::ManualClock;

    const TICK: Duration = Duration::from_micros(10);

    #[test]
    fn test_pace_holds_target_on_virtual_clock() {
        let clock = ManualClock::new(TICK);
        let mut pacer = FramePacer::new(clock.clone(), 60.0, DEFAULT_SPIN_THRESHOLD);

        for _ in 0..10 {
            clock.advance(Duration::from_millis(2));
            pacer.pace();
            let frame = pacer.last_frame_time();
            assert!(frame >= pacer.target());
            assert!(frame < pacer.target() + Duration::from_micros(50));
        }
    }

    #[test]
    fn test_slow_frame_does_not_wait() {
        let clock = ManualClock::new(TICK);
        let mut pacer = FramePacer::new(clock.clone(), 60.0, DEFAULT_SPIN_THRESHOLD);

        clock.advance(Duration::from_millis(25));
        let before = clock.elapsed();
        pacer.pace();
        // Only the readings inside pace() moved the clock
        assert!(clock.elapsed() - before < Duration::from_micros(50));
        assert!(pacer.last_frame_time() >= Duration::from_millis(25));
    }

    #[test]
    fn test_frame_start_chains_without_drift() {
        let clock = ManualClock::new(TICK);
        let mut pacer = FramePacer::new(clock.clone(), 100.0, DEFAULT_SPIN_THRESHOLD);
        let start = pacer.frame_start();

        for _ in 0..100 {
            pacer.pace();
        }

        // 100 frames of 10ms, plus at most a few ticks of overshoot each
        let total = pacer.frame_start() - start;
        assert!(total >= Duration::from_secs(1));
        assert!(total < Duration::from_secs(1) + Duration::from_millis(5));
    }

    #[test]
    #[should_panic(expected = "frame rate must be positive")]
    fn test_zero_rate_panics() {
        let _ = FramePacer::new(ManualClock::new(TICK), 0.0, DEFAULT_SPIN_THRESHOLD);
    }

    #[test]
    fn test_pace_on_system_clock() {
        let mut pacer = FramePacer::with_system_clock(60.0);
        let mut iterations = Vec::new();

        for _ in 0..6 {
            let start = Instant::now();
            std::thread::sleep(Duration::from_millis(2));
            pacer.pace();
            iterations.push(start.elapsed());
        }

        // First iteration includes setup time before the loop started
        for frame in &iterations[1..] {
            assert!(*frame >= Duration::from_micros(16_500), "frame too short: {frame:?}");
        }
        iterations.sort();
        let median = iterations[iterations.len() / 2];
        assert!(median < Duration::from_millis(18), "median frame too long: {median:?}");
    }
}
