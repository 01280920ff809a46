//! Stream configuration
//!
//! The stream runs on fixed assumptions: signed 16-bit interleaved PCM at a
//! known sample rate, a fixed hardware callback size and a fixed simulation
//! frame rate. Everything the driver needs to size its ring and pace its loop
//! lives in [`StreamConfig`], which can also be loaded from a JSON file.

use crate::sync::round_up_to_multiple;
use crate::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default sample rate (48 kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default simulation frame rate
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// Default hardware callback size in sample frames
pub const DEFAULT_CALLBACK_FRAMES: u32 = 256;

/// The only sample format the stream carries
pub const BITS_PER_SAMPLE: u16 = 16;

/// Configuration for frame-paced streaming
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Interleaved channels
    pub channels: u16,

    /// Bits per sample (always 16)
    pub bits_per_sample: u16,

    /// Sample frames the hardware asks for per callback
    pub callback_frames: u32,

    /// Size of the ring buffer in bytes.
    /// Typical: one second of audio (192000 bytes at 48 kHz stereo)
    pub capacity_bytes: usize,

    /// Simulation frames per second
    pub target_frame_rate: f64,

    /// Averaging window of the latency estimator, in frames
    pub estimator_window: u32,

    /// Remaining frame time below which the pacer busy-waits, in microseconds
    pub spin_threshold_us: u64,
}

impl StreamConfig {
    /// Create a configuration with default estimator and pacer tuning
    pub fn new(
        capacity_bytes: usize,
        sample_rate: u32,
        channels: u16,
        callback_frames: u32,
        target_frame_rate: f64,
    ) -> Self {
        StreamConfig {
            sample_rate,
            channels,
            bits_per_sample: BITS_PER_SAMPLE,
            callback_frames,
            capacity_bytes,
            target_frame_rate,
            ..Self::default()
        }
    }

    /// Create a configuration with a short ring
    /// Buffer = 250ms of stereo audio
    pub fn low_latency(sample_rate: u32) -> Self {
        let stride = 2 * (BITS_PER_SAMPLE as usize / 8);
        Self::new(
            sample_rate as usize / 4 * stride,
            sample_rate,
            2,
            DEFAULT_CALLBACK_FRAMES,
            DEFAULT_FRAME_RATE,
        )
    }

    /// Create a configuration with a long ring
    /// Buffer = 1s of stereo audio
    pub fn stable(sample_rate: u32) -> Self {
        let stride = 2 * (BITS_PER_SAMPLE as usize / 8);
        Self::new(
            sample_rate as usize * stride,
            sample_rate,
            2,
            DEFAULT_CALLBACK_FRAMES,
            DEFAULT_FRAME_RATE,
        )
    }

    /// Bytes per sample frame
    pub fn stride(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }

    /// Ring capacity in sample frames
    pub fn capacity_samples(&self) -> usize {
        match self.stride() {
            0 => 0,
            stride => self.capacity_bytes / stride,
        }
    }

    /// Nominal sample frames consumed per simulation frame
    pub fn samples_per_frame(&self) -> f64 {
        self.sample_rate as f64 / self.target_frame_rate
    }

    /// Pacer spin threshold
    pub fn spin_threshold(&self) -> Duration {
        Duration::from_micros(self.spin_threshold_us)
    }

    /// Get ring latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.capacity_samples() as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Check that the values describe a stream the driver can run.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(StreamError::ConfigError(
                "Sample rate must be greater than 0".into(),
            ));
        }
        if self.channels == 0 {
            return Err(StreamError::ConfigError(
                "Channel count must be greater than 0".into(),
            ));
        }
        if self.bits_per_sample != BITS_PER_SAMPLE {
            return Err(StreamError::ConfigError(format!(
                "Only {BITS_PER_SAMPLE}-bit samples are supported, got {}",
                self.bits_per_sample
            )));
        }
        if self.callback_frames == 0 {
            return Err(StreamError::ConfigError(
                "Callback size must be greater than 0".into(),
            ));
        }
        if !self.target_frame_rate.is_finite() || self.target_frame_rate <= 0.0 {
            return Err(StreamError::ConfigError(format!(
                "Frame rate must be positive, got {}",
                self.target_frame_rate
            )));
        }
        if self.estimator_window == 0 {
            return Err(StreamError::ConfigError(
                "Estimator window must be at least 1 frame".into(),
            ));
        }

        let stride = self.stride();
        if self.capacity_bytes == 0 || self.capacity_bytes % stride != 0 {
            return Err(StreamError::ConfigError(format!(
                "Ring capacity {} must be a non-zero multiple of the {stride}-byte sample frame",
                self.capacity_bytes
            )));
        }

        // Steady-state look-ahead must fit without clamping
        let callback = self.callback_frames as usize;
        let lookahead = (2.0 * self.samples_per_frame()).ceil() as usize + callback;
        let lookahead = round_up_to_multiple(lookahead, callback);
        if lookahead > self.capacity_samples() {
            return Err(StreamError::ConfigError(format!(
                "Ring of {} samples cannot hold the {lookahead}-sample look-ahead",
                self.capacity_samples()
            )));
        }

        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: StreamConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 2,
            bits_per_sample: BITS_PER_SAMPLE,
            callback_frames: DEFAULT_CALLBACK_FRAMES,
            capacity_bytes: DEFAULT_SAMPLE_RATE as usize * 4,
            target_frame_rate: DEFAULT_FRAME_RATE,
            estimator_window: crate::sync::DEFAULT_WINDOW_FRAMES,
            spin_threshold_us: crate::timing::DEFAULT_SPIN_THRESHOLD.as_micros() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.channels, 2);
        assert_eq!(config.stride(), 4);
        assert_eq!(config.capacity_bytes, 192_000);
        assert_eq!(config.capacity_samples(), 48_000);
        assert_eq!(config.spin_threshold(), Duration::from_micros(1100));
        assert_relative_eq!(config.samples_per_frame(), 800.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_config_latency() {
        let config = StreamConfig::low_latency(48_000);
        assert_relative_eq!(config.latency_ms(), 250.0);
        assert_relative_eq!(StreamConfig::stable(48_000).latency_ms(), 1000.0);
        assert_eq!(StreamConfig::stable(48_000), StreamConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = StreamConfig::default();
        config.bits_per_sample = 24;
        assert!(matches!(config.validate(), Err(StreamError::ConfigError(_))));

        let config = StreamConfig::new(192_002, 48_000, 2, 256, 60.0);
        assert!(config.validate().is_err());

        let config = StreamConfig::new(192_000, 48_000, 2, 0, 60.0);
        assert!(config.validate().is_err());

        let config = StreamConfig::new(192_000, 48_000, 2, 256, 0.0);
        assert!(config.validate().is_err());

        let config = StreamConfig::new(192_000, 48_000, 0, 256, 60.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ring_smaller_than_lookahead() {
        // 2*800 + 256 = 1856 -> 2048 samples needed
        let config = StreamConfig::new(2047 * 4, 48_000, 2, 256, 60.0);
        assert!(config.validate().is_err());
        let config = StreamConfig::new(2048 * 4, 48_000, 2, 256, 60.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let config = StreamConfig::from_json_str(r#"{ "sample_rate": 44100, "capacity_bytes": 176400 }"#)
            .unwrap();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channels, 2);
        assert_eq!(config.callback_frames, 256);
        assert_eq!(config.estimator_window, 30);
    }

    #[test]
    fn test_json_file_roundtrip() {
        let config = StreamConfig::low_latency(48_000);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string_pretty(&config).unwrap().as_bytes())
            .unwrap();

        let loaded = StreamConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_json_errors() {
        assert!(matches!(
            StreamConfig::from_json_str("{ not json"),
            Err(StreamError::Json(_))
        ));
        assert!(matches!(
            StreamConfig::from_json_file("/nonexistent/stream.json"),
            Err(StreamError::Io(_))
        ));
        assert!(matches!(
            StreamConfig::from_json_str(r#"{ "channels": 0 }"#),
            Err(StreamError::ConfigError(_))
        ));
    }
}
