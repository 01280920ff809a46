//! frame-audio: play a test tone through the frame-paced streaming driver

use anyhow::{Context, Result};
use clap::Parser;
use frame_audio::streaming::{NegotiatedFormat, SimulatedOutput};
use frame_audio::{AudioOutput, StreamConfig, StreamingDriver, Synthesizer};
use std::f64::consts::TAU;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "frame-audio", version, about = "Frame-paced audio streaming demo")]
struct Args {
    /// JSON stream configuration (defaults: 48 kHz stereo, 1 s ring, 60 fps)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long to run, in seconds
    #[arg(short, long, default_value_t = 5.0)]
    seconds: f64,

    /// Tone frequency in Hz
    #[arg(short, long, default_value_t = 256.0)]
    frequency: f64,

    /// Tone volume, 0.0 to 1.0
    #[arg(short, long, default_value_t = 0.1)]
    volume: f64,

    /// Drain the ring from a timer thread instead of the sound card
    #[arg(long)]
    simulate: bool,
}

/// Sine tone written as interleaved native-endian s16, same value on every channel
struct ToneGenerator {
    phase: f64,
    step: f64,
    amplitude: f64,
    channels: usize,
}

impl ToneGenerator {
    fn new(frequency: f64, volume: f64, config: &StreamConfig) -> Self {
        ToneGenerator {
            phase: 0.0,
            step: TAU * frequency / config.sample_rate as f64,
            amplitude: volume.clamp(0.0, 1.0) * i16::MAX as f64,
            channels: config.channels as usize,
        }
    }
}

impl Synthesizer for ToneGenerator {
    fn fill(&mut self, buffer: &mut [u8]) {
        for frame in buffer.chunks_exact_mut(self.channels * 2) {
            let value = (self.phase.sin() * self.amplitude) as i16;
            for sample in frame.chunks_exact_mut(2) {
                sample.copy_from_slice(&value.to_ne_bytes());
            }
            self.phase = (self.phase + self.step) % TAU;
        }
    }
}

fn simulated_output(config: &StreamConfig) -> Box<dyn AudioOutput> {
    Box::new(SimulatedOutput::new(NegotiatedFormat::from_config(config)))
}

#[cfg(feature = "streaming")]
fn device_output(config: &StreamConfig) -> Result<Box<dyn AudioOutput>> {
    let device =
        frame_audio::AudioDevice::open_default(config).context("Failed to open audio output")?;
    info!("Playing on '{}'", device.name());
    Ok(Box::new(device))
}

#[cfg(not(feature = "streaming"))]
fn device_output(config: &StreamConfig) -> Result<Box<dyn AudioOutput>> {
    info!("Built without the \"streaming\" feature; using the simulated output");
    Ok(simulated_output(config))
}

fn open_output(config: &StreamConfig, simulate: bool) -> Result<Box<dyn AudioOutput>> {
    if simulate {
        return Ok(simulated_output(config));
    }
    device_output(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => StreamConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => StreamConfig::default(),
    };

    let output = open_output(&config, args.simulate)?;
    let mut driver =
        StreamingDriver::initialize(config, output).context("Failed to start streaming")?;
    let mut tone = ToneGenerator::new(args.frequency, args.volume, &config);

    let frames = (args.seconds.max(0.0) * config.target_frame_rate).round() as u64;
    info!("Running {} frames at {} fps", frames, config.target_frame_rate);
    for _ in 0..frames {
        driver.run_one_frame(&mut tone);
    }

    let latency = driver.latency_ms();
    let stats = driver.shutdown();
    println!("Queued at exit: {:.1} ms", latency);
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
