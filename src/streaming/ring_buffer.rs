//! Ring buffer shared between the simulation thread and the audio callback
//!
//! A fixed-size circular byte store with two cursors:
//! - Producer (simulation thread): reserves up to two regions, fills them, commits
//! - Consumer (hardware callback): drains whatever length the device asks for
//!
//! The buffer itself holds no lock. Every method here is called with the
//! transport mutex held (see [`super::transport`]), so plain fields are enough.
//!
//! Besides the two cursors the buffer keeps monotonic byte totals. Their
//! difference is the number of unread bytes, which lets the consumer notice an
//! underrun and lets the latency estimator notice a cursor that wrapped more
//! than once between two measurements.

use crate::{Result, StreamError};

/// Distance from `prev` to `curr` walking forward around a ring of `size` slots.
///
/// Handles a single wraparound only; two positions one full lap apart read as `0`.
#[inline]
pub fn ring_distance(prev: usize, curr: usize, size: usize) -> usize {
    if curr >= prev {
        curr - prev
    } else {
        curr + size - prev
    }
}

/// Up to two contiguous byte ranges to fill before the next commit.
///
/// `first` starts at `start`; `second` (if non-zero) starts at offset 0 because the
/// requested range wrapped past the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRegions {
    /// Offset of the first region (the write cursor at reservation time)
    pub start: usize,
    /// Length of the region starting at `start`
    pub first: usize,
    /// Length of the wrapped region starting at offset 0
    pub second: usize,
}

impl WriteRegions {
    /// Total bytes covered by both regions
    pub fn len(&self) -> usize {
        self.first + self.second
    }

    /// True when there is nothing to write
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Circular byte buffer with a write cursor and a play cursor
#[derive(Debug)]
pub struct RingBuffer {
    /// Sample storage, zeroed (silence) at allocation
    data: Vec<u8>,
    /// Bytes per sample frame (sample size * channels)
    stride: usize,
    /// Next byte the producer writes (mutated by the producer only)
    write_cursor: usize,
    /// Next byte the hardware reads (mutated by the consumer only)
    play_cursor: usize,
    /// Bytes committed since allocation
    written_total: u64,
    /// Bytes drained since playback became active
    played_total: u64,
    /// Number of consume calls that ran past the written data
    underrun_count: u64,
    /// Bytes played that had not been written
    underrun_bytes: u64,
    /// Set by the first non-empty commit
    playing: bool,
}

impl RingBuffer {
    /// Allocate a ring of `capacity` bytes for sample frames of `stride` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ConfigError`] if:
    /// - `stride` or `capacity` is 0
    /// - `capacity` is not a multiple of `stride`
    pub fn new(capacity: usize, stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(StreamError::ConfigError(
                "Sample frame stride must be greater than 0".into(),
            ));
        }
        if capacity == 0 {
            return Err(StreamError::ConfigError(
                "Ring buffer capacity must be greater than 0".into(),
            ));
        }
        if capacity % stride != 0 {
            return Err(StreamError::ConfigError(format!(
                "Ring buffer capacity {capacity} is not a multiple of the {stride}-byte sample frame"
            )));
        }

        Ok(RingBuffer {
            data: vec![0; capacity],
            stride,
            write_cursor: 0,
            play_cursor: 0,
            written_total: 0,
            played_total: 0,
            underrun_count: 0,
            underrun_bytes: 0,
            playing: false,
        })
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes per sample frame
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Capacity in sample frames
    pub fn capacity_samples(&self) -> usize {
        self.data.len() / self.stride
    }

    /// Current write cursor (bytes)
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    /// Current play cursor (bytes)
    pub fn play_cursor(&self) -> usize {
        self.play_cursor
    }

    /// Bytes committed since allocation
    pub fn written_total(&self) -> u64 {
        self.written_total
    }

    /// Bytes drained by the consumer since playback became active
    pub fn played_total(&self) -> u64 {
        self.played_total
    }

    /// Written but not yet played bytes. Negative once playback overtook the writer.
    pub fn unread_bytes(&self) -> i64 {
        self.written_total as i64 - self.played_total as i64
    }

    /// Number of consume calls that read past the write cursor
    pub fn underrun_count(&self) -> u64 {
        self.underrun_count
    }

    /// Total bytes played that had not been written yet
    pub fn underrun_bytes(&self) -> u64 {
        self.underrun_bytes
    }

    /// Whether the producer has committed anything yet
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Split the range `[write_cursor, target_index)` (circularly) into at most two regions.
    pub fn reserve_write_regions(&self, target_index: usize) -> WriteRegions {
        let capacity = self.capacity();
        debug_assert!(target_index < capacity, "target index {target_index} out of range");
        debug_assert_eq!(target_index % self.stride, 0, "target index not frame aligned");

        if self.write_cursor <= target_index {
            WriteRegions {
                start: self.write_cursor,
                first: target_index - self.write_cursor,
                second: 0,
            }
        } else {
            WriteRegions {
                start: self.write_cursor,
                first: capacity - self.write_cursor,
                second: target_index,
            }
        }
    }

    /// Copy `src` into the regions returned by [`Self::reserve_write_regions`].
    ///
    /// Does not move the write cursor; follow with [`Self::commit_write`].
    ///
    /// # Panics
    ///
    /// If `src.len()` differs from `regions.len()` or the regions were reserved
    /// against a different write cursor.
    pub fn copy_into_regions(&mut self, regions: &WriteRegions, src: &[u8]) {
        assert_eq!(
            src.len(),
            regions.len(),
            "source length must match the reserved regions"
        );
        assert_eq!(
            regions.start, self.write_cursor,
            "regions were reserved against a stale write cursor"
        );

        let start = regions.start;
        self.data[start..start + regions.first].copy_from_slice(&src[..regions.first]);
        if regions.second > 0 {
            self.data[..regions.second].copy_from_slice(&src[regions.first..]);
        }
    }

    /// Advance the write cursor by `bytes_written`.
    ///
    /// # Panics
    ///
    /// If `bytes_written` is larger than the buffer or not a whole number of sample frames.
    pub fn commit_write(&mut self, bytes_written: usize) {
        assert!(
            bytes_written <= self.capacity(),
            "commit of {bytes_written} bytes exceeds ring capacity {}",
            self.capacity()
        );
        assert_eq!(
            bytes_written % self.stride,
            0,
            "commit must be a whole number of sample frames"
        );

        self.write_cursor = (self.write_cursor + bytes_written) % self.capacity();
        self.written_total += bytes_written as u64;
        if bytes_written > 0 {
            self.playing = true;
        }
    }

    /// Move the write cursor up to the play cursor if playback overtook the writer.
    ///
    /// The bytes between the two were already played as stale data and are
    /// dropped from the accounting, so the next reservation starts at the
    /// play cursor and the totals agree with the cursor positions again.
    /// Returns the number of bytes skipped (0 if the writer is not behind).
    pub fn catch_up_writer(&mut self) -> u64 {
        if !self.playing || self.written_total >= self.played_total {
            return 0;
        }
        let skipped = self.played_total - self.written_total;
        self.write_cursor = self.play_cursor;
        self.written_total = self.played_total;
        skipped
    }

    /// Drain `dest.len()` bytes starting at the play cursor (consumer side).
    ///
    /// Before the first commit the destination is filled with silence and the
    /// play cursor stays put. After that the cursor always advances by the full
    /// length; reading past the written data is counted as an underrun and the
    /// stale bytes are played as they are.
    ///
    /// Returns `true` if this call underran.
    ///
    /// # Panics
    ///
    /// If the device asks for more bytes than the ring holds.
    pub fn consume(&mut self, dest: &mut [u8]) -> bool {
        let length = dest.len();
        let capacity = self.capacity();
        assert!(
            length <= capacity,
            "consume of {length} bytes exceeds ring capacity {capacity}"
        );

        if !self.playing {
            dest.fill(0);
            return false;
        }

        let unread = self.unread_bytes();
        let underrun = length as i64 > unread;
        if underrun {
            self.underrun_count += 1;
            self.underrun_bytes += (length as i64 - unread.max(0)) as u64;
        }

        let space_left = capacity - self.play_cursor;
        if length > space_left {
            dest[..space_left].copy_from_slice(&self.data[self.play_cursor..]);
            dest[space_left..].copy_from_slice(&self.data[..length - space_left]);
        } else {
            dest.copy_from_slice(&self.data[self.play_cursor..self.play_cursor + length]);
        }

        self.play_cursor = (self.play_cursor + length) % capacity;
        self.played_total += length as u64;

        underrun
    }
}
