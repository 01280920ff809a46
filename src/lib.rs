//! Frame-paced audio streaming
//!
//! Keeps a simulation loop running at a fixed frame rate in step with an audio
//! device that drains samples on its own clock. The two meet in a lock-protected
//! ring buffer:
//! - the device callback drains whatever length it wants from the play cursor
//! - once per frame the driver measures how far the play cursor moved, estimates
//!   how much the device consumes per frame, and writes just enough audio to stay
//!   about two frames ahead
//! - a sleep-then-spin pacer holds each frame to its target duration
//!
//! # Crate feature flags
//! - `streaming` (default): cpal-backed [`streaming::AudioDevice`] for the default sound card
//!
//! # Quick start
//! ```no_run
//! # #[cfg(feature = "streaming")]
//! # {
//! use frame_audio::{StreamConfig, StreamingDriver};
//!
//! let config = StreamConfig::default();
//! let mut driver = StreamingDriver::open_default(config).unwrap();
//! for _ in 0..600 {
//!     driver.run_one_frame(&mut |buf: &mut [u8]| buf.fill(0));
//! }
//! let stats = driver.shutdown();
//! println!("{} underruns", stats.underrun_count);
//! # }
//! ```
//!
//! ## Headless
//! ```
//! use frame_audio::streaming::{NegotiatedFormat, SimulatedOutput};
//! use frame_audio::{StreamConfig, StreamingDriver};
//!
//! let config = StreamConfig::default();
//! let output = SimulatedOutput::new(NegotiatedFormat::from_config(&config));
//! let mut driver = StreamingDriver::initialize(config, Box::new(output)).unwrap();
//! driver.run_one_frame(&mut |buf: &mut [u8]| buf.fill(0));
//! driver.shutdown();
//! ```

#![warn(missing_docs)]

pub mod config; // Stream Configuration
pub mod driver; // Per-Frame Orchestration
pub mod streaming; // Ring Buffer, Transport & Outputs
pub mod sync; // Latency Estimation & Write Target
pub mod timing; // Clocks & Frame Pacing

/// Error types for audio streaming
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// Audio device could not be opened, built or started
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Output runs at a different format than the stream was configured for
    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    FormatMismatch {
        /// Format the stream was configured for
        expected: String,
        /// Format the output offered
        actual: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem or thread spawning
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for StreamError {
    /// Converts a String into `StreamError::Other`.
    ///
    /// Prefer a specific variant (`ConfigError`, `AudioDeviceError`) where one applies.
    fn from(msg: String) -> Self {
        StreamError::Other(msg)
    }
}

impl From<&str> for StreamError {
    /// Converts a string slice into `StreamError::Other`.
    fn from(msg: &str) -> Self {
        StreamError::Other(msg.to_string())
    }
}

/// Result type for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;

// Public API exports
pub use config::StreamConfig;
pub use driver::{FrameReport, StreamingDriver, Synthesizer};
#[cfg(feature = "streaming")]
pub use streaming::AudioDevice;
pub use streaming::{
    AudioOutput, CallbackConsumer, NegotiatedFormat, PlaybackStats, RingBuffer, SharedRing,
    SimulatedOutput,
};
pub use sync::LatencyEstimator;
pub use timing::{Clock, FramePacer, SystemClock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StreamError::FormatMismatch {
            expected: "48000 Hz".into(),
            actual: "44100 Hz".into(),
        };
        assert_eq!(
            err.to_string(),
            "Audio format mismatch: expected 48000 Hz, got 44100 Hz"
        );
        let err: StreamError = "boom".into();
        assert!(matches!(err, StreamError::Other(ref m) if m == "boom"));
    }
}
