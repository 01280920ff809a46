//! Adaptive estimate of how many samples the hardware drains per simulation frame
//!
//! Two exponential moving averages are fed once per frame from play cursor
//! deltas measured with [`ring_distance`]:
//! - samples consumed between consecutive target computations (one frame)
//! - samples consumed between the start of the frame and the target computation
//!
//! Cursor deltas only handle one wraparound. Each measurement is cross-checked
//! against the monotonic consumed total; a delta of a full ring or more means
//! the producer stalled long enough for the cursor to lap, and the measurement
//! is dropped instead of averaged.

use crate::streaming::ring_buffer::ring_distance;
use crate::streaming::transport::PlayPosition;

/// Default averaging window, in frames
pub const DEFAULT_WINDOW_FRAMES: u32 = 30;

/// One step of an exponential moving average with window `n`
#[inline]
pub fn ema(avg: f64, n: f64, sample: f64) -> f64 {
    avg - avg / n + sample / n
}

/// A single cursor delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Ring-aware distance in sample frames
    pub samples: usize,
    /// The cursor advanced a full ring or more; `samples` is meaningless
    pub stalled: bool,
}

/// What one estimator update observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EstimatorUpdate {
    /// Samples consumed since the previous target computation
    pub since_last_target: Measurement,
    /// Samples consumed since the start of this frame
    pub since_frame_start: Measurement,
}

impl EstimatorUpdate {
    /// Whether either measurement was dropped as a multi-wrap stall
    pub fn stalled(&self) -> bool {
        self.since_last_target.stalled || self.since_frame_start.stalled
    }
}

/// Running averages owned by the streaming driver for the stream's lifetime
#[derive(Debug, Clone)]
pub struct LatencyEstimator {
    window: f64,
    ring_samples: usize,
    avg_samples_per_frame: f64,
    avg_samples_since_frame_start: f64,
    last_target: PlayPosition,
    stalls: u64,
}

impl LatencyEstimator {
    /// Create an estimator for a ring of `ring_samples` sample frames.
    ///
    /// Both averages start at `bootstrap`, usually `sample_rate / frame_rate`.
    pub fn new(window_frames: u32, ring_samples: usize, bootstrap: f64) -> Self {
        LatencyEstimator {
            window: window_frames.max(1) as f64,
            ring_samples,
            avg_samples_per_frame: bootstrap,
            avg_samples_since_frame_start: bootstrap,
            last_target: PlayPosition::default(),
            stalls: 0,
        }
    }

    /// Average samples the hardware consumes per simulation frame
    pub fn avg_samples_per_frame(&self) -> f64 {
        self.avg_samples_per_frame
    }

    /// Average samples consumed between frame start and target computation
    pub fn avg_samples_since_frame_start(&self) -> f64 {
        self.avg_samples_since_frame_start
    }

    /// Measurements dropped because the cursor lapped the ring
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    /// Ring-aware delta between two positions, flagged if it cannot be trusted
    pub fn measure(&self, prev: PlayPosition, curr: PlayPosition) -> Measurement {
        let lapped = curr.total_samples.saturating_sub(prev.total_samples);
        Measurement {
            samples: ring_distance(prev.sample, curr.sample, self.ring_samples),
            stalled: lapped >= self.ring_samples as u64,
        }
    }

    /// Feed this frame's cursor positions into both averages.
    ///
    /// `frame_start` is the play position recorded when the frame began,
    /// `current` the one read right before computing the write target.
    pub fn update(&mut self, frame_start: PlayPosition, current: PlayPosition) -> EstimatorUpdate {
        let since_last_target = self.measure(self.last_target, current);
        let since_frame_start = self.measure(frame_start, current);

        if since_last_target.stalled {
            self.stalls += 1;
        } else {
            self.avg_samples_per_frame = ema(
                self.avg_samples_per_frame,
                self.window,
                since_last_target.samples as f64,
            );
        }

        if since_frame_start.stalled {
            self.stalls += 1;
        } else {
            self.avg_samples_since_frame_start = ema(
                self.avg_samples_since_frame_start,
                self.window,
                since_frame_start.samples as f64,
            );
        }

        self.last_target = current;

        EstimatorUpdate {
            since_last_target,
            since_frame_start,
        }
    }
}
