//! Streaming driver
//!
//! Owns the ring, the estimator and the pacer, and runs the per-frame sequence:
//!
//! 1. snapshot the play cursor
//! 2. update the latency estimator
//! 3. compute the write target
//! 4. reserve the regions up to the target (lock held for cursor reads only)
//! 5. synthesize into the scratch buffer (lock released)
//! 6. publish the scratch bytes and commit (lock held for the copy)
//! 7. pace the frame
//!
//! Shutdown stops the output before the ring goes away, so no callback can run
//! against freed storage.

use crate::config::StreamConfig;
use crate::streaming::{
    AudioOutput, NegotiatedFormat, PlayPosition, PlaybackStats, RingSnapshot, SharedRing,
    StatsLogger,
};
use crate::sync::{compute_target, EstimatorUpdate, LatencyEstimator, TargetParams, WriteTarget};
use crate::timing::{Clock, FramePacer, SystemClock};
use crate::{Result, StreamError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Produces audio bytes for the driver.
///
/// Must fill exactly `buffer.len()` bytes of interleaved signed 16-bit PCM and
/// keep its own phase between calls so consecutive buffers join up.
pub trait Synthesizer {
    /// Fill `buffer` completely
    fn fill(&mut self, buffer: &mut [u8]);
}

impl<F: FnMut(&mut [u8])> Synthesizer for F {
    fn fill(&mut self, buffer: &mut [u8]) {
        self(buffer)
    }
}

/// What one call to [`StreamingDriver::run_one_frame`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    /// Play cursor the target was anchored at
    pub play_position: PlayPosition,
    /// Estimator measurements for this frame
    pub estimate: EstimatorUpdate,
    /// Write target for this frame
    pub target: WriteTarget,
    /// Bytes synthesized and committed
    pub bytes_written: usize,
    /// The ring already held the full look-ahead; nothing was written
    pub skipped: bool,
    /// Underruns the consumer reported since the previous frame
    pub new_underruns: u64,
    /// Measured duration of this frame
    pub frame_time: Duration,
}

/// Frame-paced producer for one audio stream
pub struct StreamingDriver<C: Clock = SystemClock> {
    config: StreamConfig,
    ring: SharedRing,
    output: Box<dyn AudioOutput>,
    estimator: LatencyEstimator,
    params: TargetParams,
    pacer: FramePacer<C>,
    scratch: Vec<u8>,
    frame_start_position: PlayPosition,
    stats: PlaybackStats,
    stats_logger: StatsLogger,
    stopped: bool,
}

impl StreamingDriver<SystemClock> {
    /// Start streaming to `output`, paced by the wall clock.
    ///
    /// # Errors
    ///
    /// - [`StreamError::ConfigError`] if the configuration is invalid
    /// - [`StreamError::FormatMismatch`] if the output runs at a different format
    /// - whatever the output's `start` returns
    pub fn initialize(config: StreamConfig, output: Box<dyn AudioOutput>) -> Result<Self> {
        Self::initialize_with_clock(config, output, SystemClock)
    }

    /// Open the default sound card and start streaming to it.
    #[cfg(feature = "streaming")]
    pub fn open_default(config: StreamConfig) -> Result<Self> {
        let device = crate::streaming::AudioDevice::open_default(&config)?;
        Self::initialize(config, Box::new(device))
    }
}

impl<C: Clock> StreamingDriver<C> {
    /// Start streaming to `output`, paced by `clock`.
    pub fn initialize_with_clock(
        config: StreamConfig,
        mut output: Box<dyn AudioOutput>,
        clock: C,
    ) -> Result<Self> {
        config.validate()?;

        let expected = NegotiatedFormat::from_config(&config);
        let actual = output.negotiated_format();
        if actual != expected {
            error!("Audio output format {} does not match {}", actual, expected);
            return Err(StreamError::FormatMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }

        let stride = config.stride();
        let ring = SharedRing::new(config.capacity_bytes, stride)?;
        let scratch = vec![0u8; config.capacity_bytes];
        let estimator = LatencyEstimator::new(
            config.estimator_window,
            config.capacity_samples(),
            config.samples_per_frame(),
        );
        let params = TargetParams {
            capacity_bytes: config.capacity_bytes,
            stride,
            callback_samples: config.callback_frames as usize,
        };

        output.start(ring.consumer())?;

        let pacer = FramePacer::new(clock, config.target_frame_rate, config.spin_threshold());
        let stats_logger = StatsLogger::new(pacer.frame_start(), Duration::from_secs(1));
        let frame_start_position = ring.play_position();

        info!(
            "Streaming started: {}, ring {} bytes ({:.0} ms), {} fps",
            expected,
            config.capacity_bytes,
            config.latency_ms(),
            config.target_frame_rate
        );

        Ok(StreamingDriver {
            config,
            ring,
            output,
            estimator,
            params,
            pacer,
            scratch,
            frame_start_position,
            stats: PlaybackStats::default(),
            stats_logger,
            stopped: false,
        })
    }

    /// Run one simulation frame: top up the ring to the write target, then wait out the frame.
    pub fn run_one_frame<S: Synthesizer + ?Sized>(&mut self, synth: &mut S) -> FrameReport {
        self.stats.frames += 1;

        let current = self.ring.play_position();
        let estimate = self.estimator.update(self.frame_start_position, current);
        if estimate.stalled() {
            self.stats.stalls = self.estimator.stalls();
            warn!(
                "Play cursor lapped the ring between measurements (frame {}); estimate not updated",
                self.stats.frames
            );
        }

        let target = compute_target(
            self.estimator.avg_samples_per_frame(),
            self.estimator.avg_samples_since_frame_start(),
            current.sample,
            &self.params,
        );
        if target.clamped {
            self.stats.clamped_targets += 1;
            warn!(
                "Write target of {:.0} samples exceeds the ring; clamped to {}",
                target.raw_samples_ahead, target.samples_ahead
            );
        }

        let reservation = self.ring.reserve(target.index);
        if reservation.skipped_bytes > 0 {
            self.stats.writer_resyncs += 1;
            warn!(
                "Playback overtook the writer by {} bytes; resuming at the play cursor",
                reservation.skipped_bytes
            );
        }
        let anchor_bytes = current.total_samples * self.params.stride as u64;
        let lead = reservation.written_total as i64 - anchor_bytes as i64;

        let skipped = lead >= target.bytes_ahead as i64;
        let bytes_written = if skipped {
            self.stats.skipped_frames += 1;
            debug!(
                "Ring already {} bytes ahead of a {}-byte target; skipping write",
                lead, target.bytes_ahead
            );
            0
        } else {
            let len = reservation.regions.len();
            let buffer = &mut self.scratch[..len];
            synth.fill(buffer);
            self.ring.publish(&reservation.regions, buffer);
            len
        };
        self.stats.bytes_written += bytes_written as u64;

        let snapshot = self.ring.snapshot();
        let new_underruns = snapshot.underrun_count - self.stats.underrun_count;
        if new_underruns > 0 {
            warn!(
                "Audio underrun: {} callback(s) played {} unwritten bytes",
                new_underruns,
                snapshot.underrun_bytes - self.stats.underrun_bytes
            );
        }
        self.stats.underrun_count = snapshot.underrun_count;
        self.stats.underrun_bytes = snapshot.underrun_bytes;
        self.stats.record_fill(snapshot.unread_bytes());

        self.pacer.pace();
        let frame_time = self.pacer.last_frame_time();
        self.stats.record_frame_time(frame_time);
        self.frame_start_position = self.ring.play_position();

        self.stats_logger
            .maybe_log(self.pacer.frame_start(), &self.stats, self.params.capacity_bytes);

        FrameReport {
            play_position: current,
            estimate,
            target,
            bytes_written,
            skipped,
            new_underruns,
            frame_time,
        }
    }

    /// Stop the output, then release the ring. Returns the final statistics.
    pub fn shutdown(mut self) -> PlaybackStats {
        self.stop_output();
        let snapshot = self.ring.snapshot();
        self.stats.underrun_count = snapshot.underrun_count;
        self.stats.underrun_bytes = snapshot.underrun_bytes;
        self.stats.unread_bytes = snapshot.unread_bytes();
        info!(
            "Streaming stopped after {} frames ({} bytes, {} underruns)",
            self.stats.frames, self.stats.bytes_written, self.stats.underrun_count
        );
        self.stats
    }

    fn stop_output(&mut self) {
        if !self.stopped {
            self.output.stop();
            self.stopped = true;
        }
    }

    /// Stream configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Statistics so far
    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    /// Latency estimator state
    pub fn estimator(&self) -> &LatencyEstimator {
        &self.estimator
    }

    /// Current ring cursors and counters
    pub fn ring(&self) -> RingSnapshot {
        self.ring.snapshot()
    }

    /// Frame pacer
    pub fn pacer(&self) -> &FramePacer<C> {
        &self.pacer
    }

    /// Audio queued ahead of the play cursor, in milliseconds
    pub fn latency_ms(&self) -> f32 {
        let unread = self.ring.snapshot().unread_bytes().max(0) as f32;
        unread / self.params.stride as f32 / self.config.sample_rate as f32 * 1000.0
    }
}

impl<C: Clock> Drop for StreamingDriver<C> {
    fn drop(&mut self) {
        self.stop_output();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::CallbackConsumer;
    use crate::timing::ManualClock;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Output whose callback the test drives by hand
    #[derive(Clone, Default)]
    struct ManualOutput {
        format: Option<NegotiatedFormat>,
        consumer: Arc<Mutex<Option<CallbackConsumer>>>,
        stopped: Arc<Mutex<bool>>,
    }

    impl ManualOutput {
        fn pull(&self, len: usize) -> Vec<u8> {
            let mut out = vec![0u8; len];
            if let Some(consumer) = self.consumer.lock().as_ref() {
                consumer.consume(&mut out);
            }
            out
        }
    }

    impl AudioOutput for ManualOutput {
        fn negotiated_format(&self) -> NegotiatedFormat {
            self.format.unwrap_or_else(|| NegotiatedFormat::from_config(&small_config()))
        }

        fn start(&mut self, consumer: CallbackConsumer) -> Result<()> {
            *self.consumer.lock() = Some(consumer);
            Ok(())
        }

        fn stop(&mut self) {
            *self.stopped.lock() = true;
            self.consumer.lock().take();
        }
    }

    // 10 samples per frame, 4-sample callbacks, 64-sample ring
    fn small_config() -> StreamConfig {
        StreamConfig::new(256, 600, 2, 4, 60.0)
    }

    fn driver(output: &ManualOutput) -> StreamingDriver<ManualClock> {
        StreamingDriver::initialize_with_clock(
            small_config(),
            Box::new(output.clone()),
            ManualClock::new(Duration::from_micros(10)),
        )
        .unwrap()
    }

    fn silence(buf: &mut [u8]) {
        buf.fill(0x11);
    }

    #[test]
    fn test_first_frame_writes_lookahead() {
        let output = ManualOutput::default();
        let mut driver = driver(&output);

        let report = driver.run_one_frame(&mut silence);
        // 2*9.67 - 9.67 + 4 = 13.67 -> 14 -> 16 samples
        assert_eq!(report.target.samples_ahead, 16);
        assert_eq!(report.bytes_written, 64);
        assert!(!report.skipped);
        assert_eq!(driver.ring().write_cursor, 64);
        assert!(driver.ring().playing);
        assert!(report.frame_time >= driver.pacer().target());
    }

    #[test]
    fn test_full_lookahead_skips_write() {
        let output = ManualOutput::default();
        let mut driver = driver(&output);

        driver.run_one_frame(&mut silence);
        let report = driver.run_one_frame(&mut silence);
        assert!(report.skipped);
        assert_eq!(report.bytes_written, 0);
        assert_eq!(driver.stats().skipped_frames, 1);
        assert_eq!(driver.ring().write_cursor, 64);
    }

    #[test]
    fn test_tops_up_what_was_consumed() {
        let output = ManualOutput::default();
        let mut driver = driver(&output);

        driver.run_one_frame(&mut silence);
        output.pull(32);
        let report = driver.run_one_frame(&mut silence);
        assert_eq!(report.play_position.sample, 8);
        assert_eq!(report.bytes_written, 32);
        assert_eq!(driver.ring().unread_bytes(), 64);
    }

    #[test]
    fn test_underrun_reported() {
        let output = ManualOutput::default();
        let mut driver = driver(&output);

        driver.run_one_frame(&mut silence);
        output.pull(128);
        let report = driver.run_one_frame(&mut silence);
        assert_eq!(report.new_underruns, 1);
        assert_eq!(driver.stats().underrun_count, 1);
        assert_eq!(driver.stats().underrun_bytes, 64);
    }

    #[test]
    fn test_multi_wrap_counted_as_stall() {
        let output = ManualOutput::default();
        let mut driver = driver(&output);

        driver.run_one_frame(&mut silence);
        let avg = driver.estimator().avg_samples_per_frame();
        output.pull(256);
        output.pull(256);
        let report = driver.run_one_frame(&mut silence);
        assert!(report.estimate.stalled());
        assert_eq!(driver.stats().stalls, 2);
        assert_eq!(driver.estimator().avg_samples_per_frame(), avg);
    }

    #[test]
    fn test_recovers_after_long_stall() {
        let output = ManualOutput::default();
        let mut driver = driver(&output);

        driver.run_one_frame(&mut silence);
        output.pull(256);
        output.pull(256);
        driver.run_one_frame(&mut silence);
        assert_eq!(driver.stats().writer_resyncs, 1);
        let after_stall = driver.stats().underrun_count;
        assert_eq!(after_stall, 2);

        for _ in 0..50 {
            output.pull(32);
            let report = driver.run_one_frame(&mut silence);
            assert_eq!(report.new_underruns, 0);
        }

        assert_eq!(driver.stats().underrun_count, after_stall);
        assert_eq!(driver.stats().writer_resyncs, 1);
        let ring = driver.ring();
        assert!(ring.unread_bytes() > 0);
        assert_eq!(
            ring.unread_bytes() as usize,
            (ring.write_cursor + ring.capacity - ring.play_cursor) % ring.capacity
        );
    }

    #[test]
    fn test_format_mismatch_is_fatal() {
        let mut format = NegotiatedFormat::from_config(&small_config());
        format.sample_rate = 44_100;
        let output = ManualOutput {
            format: Some(format),
            ..Default::default()
        };

        let result = StreamingDriver::initialize_with_clock(
            small_config(),
            Box::new(output.clone()),
            ManualClock::new(Duration::from_micros(10)),
        );
        assert!(matches!(result, Err(StreamError::FormatMismatch { .. })));
        // Never started
        assert!(output.consumer.lock().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let output = ManualOutput::default();
        let result = StreamingDriver::initialize_with_clock(
            StreamConfig::new(254, 600, 2, 4, 60.0),
            Box::new(output),
            ManualClock::new(Duration::from_micros(10)),
        );
        assert!(matches!(result, Err(StreamError::ConfigError(_))));
    }

    #[test]
    fn test_shutdown_stops_output() {
        let output = ManualOutput::default();
        let mut driver = driver(&output);
        driver.run_one_frame(&mut silence);

        let stats = driver.shutdown();
        assert!(*output.stopped.lock());
        assert!(output.consumer.lock().is_none());
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.bytes_written, 64);
    }

    #[test]
    fn test_drop_stops_output() {
        let output = ManualOutput::default();
        {
            let _driver = driver(&output);
        }
        assert!(*output.stopped.lock());
    }

    #[test]
    fn test_latency_ms() {
        let output = ManualOutput::default();
        let mut driver = driver(&output);
        driver.run_one_frame(&mut silence);
        // 16 samples at 600 Hz
        assert!((driver.latency_ms() - 26.666).abs() < 0.01);
    }
}
