//! Lock discipline binding the ring buffer to its two execution contexts
//!
//! [`SharedRing`] is the producer-side handle owned by the streaming driver.
//! [`CallbackConsumer`] is the narrow adapter handed to the audio subsystem.
//! Both wrap the same `parking_lot::Mutex<RingBuffer>`; every method takes the
//! lock for exactly one short critical section (cursor arithmetic plus a byte
//! copy). Synthesis happens between [`SharedRing::reserve`] and
//! [`SharedRing::publish`], with the lock released.

use super::ring_buffer::{RingBuffer, WriteRegions};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Play cursor snapshot taken under the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayPosition {
    /// Play cursor in sample frames, in `[0, capacity_samples)`
    pub sample: usize,
    /// Sample frames drained since playback became active
    pub total_samples: u64,
}

/// Result of a write reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Regions to fill
    pub regions: WriteRegions,
    /// Bytes committed so far, read in the same critical section
    pub written_total: u64,
    /// Bytes the write cursor jumped forward because playback had overtaken it
    pub skipped_bytes: u64,
}

/// Point-in-time view of the ring's cursors and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSnapshot {
    /// Capacity in bytes
    pub capacity: usize,
    /// Write cursor (bytes)
    pub write_cursor: usize,
    /// Play cursor (bytes)
    pub play_cursor: usize,
    /// Bytes committed since allocation
    pub written_total: u64,
    /// Bytes drained since playback became active
    pub played_total: u64,
    /// Consume calls that ran past the written data
    pub underrun_count: u64,
    /// Bytes played that had not been written
    pub underrun_bytes: u64,
    /// Whether the first commit happened
    pub playing: bool,
}

impl RingSnapshot {
    /// Written but unplayed bytes (negative after an underrun)
    pub fn unread_bytes(&self) -> i64 {
        self.written_total as i64 - self.played_total as i64
    }
}

/// Producer-side handle to the shared ring buffer
#[derive(Debug, Clone)]
pub struct SharedRing {
    inner: Arc<Mutex<RingBuffer>>,
    stride: usize,
    capacity: usize,
}

impl SharedRing {
    /// Allocate a zeroed ring of `capacity` bytes for `stride`-byte sample frames
    pub fn new(capacity: usize, stride: usize) -> Result<Self> {
        let ring = RingBuffer::new(capacity, stride)?;
        Ok(SharedRing {
            inner: Arc::new(Mutex::new(ring)),
            stride,
            capacity,
        })
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes per sample frame
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Snapshot the play cursor
    pub fn play_position(&self) -> PlayPosition {
        let ring = self.inner.lock();
        PlayPosition {
            sample: ring.play_cursor() / self.stride,
            total_samples: ring.played_total() / self.stride as u64,
        }
    }

    /// Compute the regions between the write cursor and `target_index`.
    ///
    /// If playback overtook the writer, the write cursor first catches up to
    /// the play cursor. Nothing is copied yet.
    pub fn reserve(&self, target_index: usize) -> Reservation {
        let mut ring = self.inner.lock();
        let skipped_bytes = ring.catch_up_writer();
        Reservation {
            regions: ring.reserve_write_regions(target_index),
            written_total: ring.written_total(),
            skipped_bytes,
        }
    }

    /// Copy synthesized bytes into the reserved regions and advance the write cursor.
    pub fn publish(&self, regions: &WriteRegions, src: &[u8]) {
        if regions.is_empty() {
            return;
        }
        let mut ring = self.inner.lock();
        ring.copy_into_regions(regions, src);
        ring.commit_write(regions.len());
    }

    /// Read all cursors and counters at once
    pub fn snapshot(&self) -> RingSnapshot {
        let ring = self.inner.lock();
        RingSnapshot {
            capacity: ring.capacity(),
            write_cursor: ring.write_cursor(),
            play_cursor: ring.play_cursor(),
            written_total: ring.written_total(),
            played_total: ring.played_total(),
            underrun_count: ring.underrun_count(),
            underrun_bytes: ring.underrun_bytes(),
            playing: ring.is_playing(),
        }
    }

    /// Adapter for the hardware callback
    pub fn consumer(&self) -> CallbackConsumer {
        CallbackConsumer {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Consumer-side adapter registered with the audio subsystem.
///
/// Must return quickly and only touches the buffer under the shared lock.
#[derive(Debug, Clone)]
pub struct CallbackConsumer {
    inner: Arc<Mutex<RingBuffer>>,
}

impl CallbackConsumer {
    /// Fill `dest` from the ring; the device decides the length.
    ///
    /// Returns `true` if this call underran.
    pub fn consume(&self, dest: &mut [u8]) -> bool {
        self.inner.lock().consume(dest)
    }
}
