//! Audio transport and output
//!
//! The ring buffer and its lock discipline, plus the outputs that drain it from
//! a hardware callback context: a cpal device (`streaming` feature) and a
//! simulated device thread for headless runs.

#[cfg(feature = "streaming")]
pub mod audio_device;
pub mod ring_buffer;
pub mod simulated;
pub mod stats;
pub mod transport;

#[cfg(feature = "streaming")]
pub use audio_device::AudioDevice;
pub use ring_buffer::{ring_distance, RingBuffer, WriteRegions};
pub use simulated::SimulatedOutput;
pub use stats::{PlaybackStats, StatsLogger};
pub use transport::{CallbackConsumer, PlayPosition, Reservation, RingSnapshot, SharedRing};

use crate::config::StreamConfig;
use crate::Result;
use std::fmt;
use std::time::Duration;

/// Stream format an output actually runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channels
    pub channels: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Sample frames per callback
    pub callback_frames: u32,
}

impl NegotiatedFormat {
    /// The format a configuration asks for
    pub fn from_config(config: &StreamConfig) -> Self {
        NegotiatedFormat {
            sample_rate: config.sample_rate,
            channels: config.channels,
            bits_per_sample: config.bits_per_sample,
            callback_frames: config.callback_frames,
        }
    }

    /// Bytes per sample frame
    pub fn stride(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }

    /// Bytes handed out per callback
    pub fn callback_bytes(&self) -> usize {
        self.callback_frames as usize * self.stride()
    }

    /// Wall-clock time one callback's worth of audio lasts
    pub fn callback_period(&self) -> Duration {
        Duration::from_secs_f64(self.callback_frames as f64 / self.sample_rate.max(1) as f64)
    }
}

impl fmt::Display for NegotiatedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, s{}, {} frames/callback",
            self.sample_rate, self.channels, self.bits_per_sample, self.callback_frames
        )
    }
}

/// A device that pulls audio from the ring on its own schedule.
///
/// Not `Send`: some backends (cpal on several hosts) pin their stream to the
/// thread that created it.
pub trait AudioOutput {
    /// Format the output runs at
    fn negotiated_format(&self) -> NegotiatedFormat;

    /// Begin invoking `consumer` from the output's callback context
    fn start(&mut self, consumer: CallbackConsumer) -> Result<()>;

    /// Stop invoking the consumer; no callback runs after this returns
    fn stop(&mut self);
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
    fn negotiated_format(&self) -> NegotiatedFormat {
        (**self).negotiated_format()
    }

    fn start(&mut self, consumer: CallbackConsumer) -> Result<()> {
        (**self).start(consumer)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}
