//! Playback statistics
//!
//! Counters for the transient conditions the driver tolerates (clamped
//! targets, estimator stalls, skipped frames, underruns) plus buffer health.
//! None of these stop the stream; they are logged and counted here.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cumulative counters for one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlaybackStats {
    /// Frames run
    pub frames: u64,
    /// Bytes synthesized and committed to the ring
    pub bytes_written: u64,
    /// Frames whose write target exceeded the ring and was clamped
    pub clamped_targets: u64,
    /// Estimator measurements dropped because the play cursor lapped the ring
    pub stalls: u64,
    /// Frames that wrote nothing because the ring already held the full look-ahead
    pub skipped_frames: u64,
    /// Frames where playback had overtaken the writer and the write cursor jumped ahead
    pub writer_resyncs: u64,
    /// Callbacks that ran past the written data
    pub underrun_count: u64,
    /// Bytes played that had not been written
    pub underrun_bytes: u64,
    /// Unread bytes at the end of the last frame (negative after an underrun)
    pub unread_bytes: i64,
    /// Smallest unread byte count seen after a write
    pub unread_bytes_min: i64,
    /// Largest unread byte count seen after a write
    pub unread_bytes_max: i64,
    /// Duration of the last paced frame, in microseconds
    pub last_frame_us: u64,
    /// Longest paced frame, in microseconds
    pub max_frame_us: u64,
}

impl PlaybackStats {
    /// Record buffer fill after a frame's write
    pub fn record_fill(&mut self, unread_bytes: i64) {
        if self.frames <= 1 {
            self.unread_bytes_min = unread_bytes;
            self.unread_bytes_max = unread_bytes;
        } else {
            self.unread_bytes_min = self.unread_bytes_min.min(unread_bytes);
            self.unread_bytes_max = self.unread_bytes_max.max(unread_bytes);
        }
        self.unread_bytes = unread_bytes;
    }

    /// Record the measured duration of a paced frame
    pub fn record_frame_time(&mut self, frame_time: Duration) {
        let us = frame_time.as_micros() as u64;
        self.last_frame_us = us;
        self.max_frame_us = self.max_frame_us.max(us);
    }

    /// Buffer fill as a percentage of `capacity` bytes
    pub fn fill_percentage(&self, capacity: usize) -> f32 {
        if capacity == 0 {
            return 0.0;
        }
        (self.unread_bytes.max(0) as f32 / capacity as f32) * 100.0
    }
}

/// Emits a stats line at most once per interval
#[derive(Debug, Clone)]
pub struct StatsLogger {
    interval: Duration,
    last_log_time: Instant,
    last: PlaybackStats,
}

impl StatsLogger {
    /// Start a logger whose first line is due one `interval` after `now`
    pub fn new(now: Instant, interval: Duration) -> Self {
        StatsLogger {
            interval,
            last_log_time: now,
            last: PlaybackStats::default(),
        }
    }

    /// Log per-interval deltas if enough time has passed; returns whether it logged.
    pub fn maybe_log(&mut self, now: Instant, stats: &PlaybackStats, capacity: usize) -> bool {
        if now.saturating_duration_since(self.last_log_time) < self.interval {
            return false;
        }

        debug!(
            "stream stats: buf={:.1}% (min={}, max={}), frames={}, bytes={}, underruns={} ({} bytes), \
             clamped={}, stalls={}, skipped={}, resyncs={}, frame={}us (max {}us)",
            stats.fill_percentage(capacity),
            stats.unread_bytes_min,
            stats.unread_bytes_max,
            stats.frames - self.last.frames,
            stats.bytes_written - self.last.bytes_written,
            stats.underrun_count - self.last.underrun_count,
            stats.underrun_bytes - self.last.underrun_bytes,
            stats.clamped_targets - self.last.clamped_targets,
            stats.stalls - self.last.stalls,
            stats.skipped_frames - self.last.skipped_frames,
            stats.writer_resyncs - self.last.writer_resyncs,
            stats.last_frame_us,
            stats.max_frame_us,
        );

        self.last = *stats;
        self.last_log_time = now;
        true
    }
}
