//! Audio device integration using cpal
//!
//! Opens the default output device at exactly the configured format: signed
//! 16-bit samples, the requested channel count and sample rate, and a fixed
//! callback size. The stream carries no format conversion, so a device that
//! cannot provide this format is a startup failure.

use super::{AudioOutput, CallbackConsumer, NegotiatedFormat};
use crate::config::StreamConfig;
use crate::{Result, StreamError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfigRange};
use tracing::{debug, error, info, warn};

/// Whether a device config range can run `format` with a fixed callback size
fn range_supports(range: &SupportedStreamConfigRange, format: &NegotiatedFormat) -> bool {
    if range.channels() != format.channels
        || range.sample_format() != SampleFormat::I16
        || range.min_sample_rate().0 > format.sample_rate
        || range.max_sample_rate().0 < format.sample_rate
    {
        return false;
    }
    match range.buffer_size() {
        SupportedBufferSize::Range { min, max } => {
            (*min..=*max).contains(&format.callback_frames)
        }
        // Backend can't tell; let the stream build decide
        SupportedBufferSize::Unknown => true,
    }
}

/// Audio playback device using cpal
pub struct AudioDevice {
    device: cpal::Device,
    stream_config: cpal::StreamConfig,
    format: NegotiatedFormat,
    name: String,
    stream: Option<cpal::Stream>,
}

impl AudioDevice {
    /// Open the default output device at the configured format.
    ///
    /// # Errors
    ///
    /// - [`StreamError::AudioDeviceError`] if there is no output device or its
    ///   configurations can't be queried
    /// - [`StreamError::FormatMismatch`] if no supported configuration matches
    pub fn open_default(config: &StreamConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            StreamError::AudioDeviceError("No audio output device available".into())
        })?;
        let name = device.name().unwrap_or_else(|_| "unknown".into());
        let format = NegotiatedFormat::from_config(config);

        let mut ranges = device.supported_output_configs().map_err(|e| {
            StreamError::AudioDeviceError(format!("Failed to query output configs: {}", e))
        })?;

        let Some(range) = ranges.find(|range| range_supports(range, &format)) else {
            let actual = device
                .default_output_config()
                .map(|c| {
                    format!(
                        "{} Hz, {} ch, {:?} (default config)",
                        c.sample_rate().0,
                        c.channels(),
                        c.sample_format()
                    )
                })
                .unwrap_or_else(|e| format!("no usable config ({})", e));
            return Err(StreamError::FormatMismatch {
                expected: format.to_string(),
                actual,
            });
        };

        if matches!(range.buffer_size(), SupportedBufferSize::Unknown) {
            warn!(
                "Device '{}' does not report buffer sizes; requesting {} frames anyway",
                name, format.callback_frames
            );
        }

        let mut stream_config: cpal::StreamConfig =
            range.with_sample_rate(SampleRate(format.sample_rate)).into();
        stream_config.buffer_size = BufferSize::Fixed(format.callback_frames);

        info!("Opened audio device '{}' ({})", name, format);

        Ok(AudioDevice {
            device,
            stream_config,
            format,
            name,
            stream: None,
        })
    }

    /// Device name as reported by the host
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the stream is running
    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

impl AudioOutput for AudioDevice {
    fn negotiated_format(&self) -> NegotiatedFormat {
        self.format
    }

    fn start(&mut self, consumer: CallbackConsumer) -> Result<()> {
        if self.stream.is_some() {
            return Err(StreamError::AudioDeviceError(
                "Audio stream already started".into(),
            ));
        }

        let stream = self
            .device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    // Underruns are counted by the ring
                    consumer.consume(bytemuck::cast_slice_mut(data));
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| StreamError::AudioDeviceError(format!("Failed to build audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| StreamError::AudioDeviceError(format!("Failed to play audio stream: {}", e)))?;

        debug!("Audio stream started on '{}'", self.name);
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause audio stream: {}", e);
            }
            // Dropping the stream unregisters the callback
            drop(stream);
            debug!("Audio stream stopped on '{}'", self.name);
        }
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
