//! Simulated audio device
//!
//! A background thread that behaves like a hardware callback: every callback
//! period it asks the consumer for one callback's worth of bytes. Used when no
//! sound card is available and to exercise the transport under real
//! concurrency.

use super::{AudioOutput, CallbackConsumer, NegotiatedFormat};
use crate::{Result, StreamError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error};

/// Output that drains the ring from a timer thread
pub struct SimulatedOutput {
    format: NegotiatedFormat,
    running: Arc<AtomicBool>,
    callbacks: Arc<AtomicU64>,
    underruns: Arc<AtomicU64>,
    capture: Option<Arc<Mutex<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedOutput {
    /// Create a stopped output running at `format`
    pub fn new(format: NegotiatedFormat) -> Self {
        SimulatedOutput {
            format,
            running: Arc::new(AtomicBool::new(false)),
            callbacks: Arc::new(AtomicU64::new(0)),
            underruns: Arc::new(AtomicU64::new(0)),
            capture: None,
            handle: None,
        }
    }

    /// Also keep a copy of every byte played; read it back with [`SimulatedOutput::captured`]
    pub fn with_capture(mut self) -> Self {
        self.capture = Some(Arc::new(Mutex::new(Vec::new())));
        self
    }

    /// Whether the callback thread is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Callbacks issued so far
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    /// Callbacks the consumer reported as underruns
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Shared handle to the captured bytes, if capture is enabled
    pub fn captured(&self) -> Option<Arc<Mutex<Vec<u8>>>> {
        self.capture.clone()
    }
}

impl AudioOutput for SimulatedOutput {
    fn negotiated_format(&self) -> NegotiatedFormat {
        self.format
    }

    fn start(&mut self, consumer: CallbackConsumer) -> Result<()> {
        if self.handle.is_some() {
            return Err(StreamError::AudioDeviceError(
                "Simulated output already started".into(),
            ));
        }

        let period = self.format.callback_period();
        let mut chunk = vec![0u8; self.format.callback_bytes()];
        let running = Arc::clone(&self.running);
        let callbacks = Arc::clone(&self.callbacks);
        let underruns = Arc::clone(&self.underruns);
        let capture = self.capture.clone();

        running.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("audio-sim".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                while running.load(Ordering::Relaxed) {
                    if consumer.consume(&mut chunk) {
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                    if let Some(capture) = &capture {
                        capture.lock().extend_from_slice(&chunk);
                    }
                    callbacks.fetch_add(1, Ordering::Relaxed);

                    // Schedule against absolute deadlines so sleep overshoot doesn't accumulate
                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                }
            });

        match handle {
            Ok(handle) => {
                self.handle = Some(handle);
                debug!("Simulated output started ({})", self.format);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Simulated output thread panicked");
            }
            debug!("Simulated output stopped after {} callbacks", self.callbacks());
        }
    }
}

impl Drop for SimulatedOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
