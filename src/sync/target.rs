//! Write target computation
//!
//! The producer aims two frames ahead of where the hardware was when the
//! current frame started, plus one callback's worth of margin. The play cursor
//! snapshot is taken part way into the frame, so the part of the frame already
//! consumed is subtracted:
//!
//! ```text
//! ahead = 2 * avg_samples_per_frame - avg_samples_since_frame_start + callback
//! ```
//!
//! `ahead` is rounded up to a whole number of callbacks and clamped to the ring.

/// Ring geometry the target is computed against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetParams {
    /// Ring capacity in bytes
    pub capacity_bytes: usize,
    /// Bytes per sample frame
    pub stride: usize,
    /// Sample frames per hardware callback
    pub callback_samples: usize,
}

impl TargetParams {
    /// Ring capacity in sample frames
    pub fn capacity_samples(&self) -> usize {
        self.capacity_bytes / self.stride
    }
}

/// Where the producer should stop writing this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteTarget {
    /// Look-ahead before rounding
    pub raw_samples_ahead: f64,
    /// Look-ahead after rounding and clamping, in sample frames
    pub samples_ahead: usize,
    /// Look-ahead in bytes
    pub bytes_ahead: usize,
    /// Byte index in `[0, capacity)`
    pub index: usize,
    /// The look-ahead exceeded the ring and was cut down to `capacity`
    pub clamped: bool,
}

/// Round `value` up to the next multiple of `multiple`; exact multiples are unchanged.
#[inline]
pub fn round_up_to_multiple(value: usize, multiple: usize) -> usize {
    if multiple == 0 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}

/// Compute the write target from the estimator averages.
///
/// `anchor_sample` is the play cursor (in sample frames) the look-ahead is measured from.
pub fn compute_target(
    avg_samples_per_frame: f64,
    avg_samples_since_frame_start: f64,
    anchor_sample: usize,
    params: &TargetParams,
) -> WriteTarget {
    let raw = 2.0 * avg_samples_per_frame - avg_samples_since_frame_start
        + params.callback_samples as f64;
    let whole = if raw.is_finite() && raw > 0.0 {
        raw.ceil() as usize
    } else {
        0
    };

    let mut samples_ahead = round_up_to_multiple(whole, params.callback_samples);
    let mut clamped = false;
    if samples_ahead.saturating_mul(params.stride) > params.capacity_bytes {
        samples_ahead = params.capacity_samples();
        clamped = true;
    }

    let bytes_ahead = samples_ahead * params.stride;
    let index = (anchor_sample * params.stride + bytes_ahead) % params.capacity_bytes;

    WriteTarget {
        raw_samples_ahead: raw,
        samples_ahead,
        bytes_ahead,
        index,
        clamped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TargetParams {
        TargetParams {
            capacity_bytes: 192_000,
            stride: 4,
            callback_samples: 256,
        }
    }

    #[test]
    fn test_round_up_to_multiple() {
        assert_eq!(round_up_to_multiple(0, 256), 0);
        assert_eq!(round_up_to_multiple(1, 256), 256);
        assert_eq!(round_up_to_multiple(256, 256), 256);
        assert_eq!(round_up_to_multiple(1356, 256), 1536);
        assert_eq!(round_up_to_multiple(1756, 256), 1792);
        assert_eq!(round_up_to_multiple(7, 0), 7);
    }

    #[test]
    fn test_target_rounds_to_callback_multiple() {
        // 2*800 - 500 + 256 = 1356 -> 1536; (1000 + 1536) * 4 = 10144
        let target = compute_target(800.0, 500.0, 1000, &params());
        assert_eq!(target.raw_samples_ahead, 1356.0);
        assert_eq!(target.samples_ahead, 1536);
        assert_eq!(target.bytes_ahead, 6144);
        assert_eq!(target.index, 10144);
        assert!(!target.clamped);
    }

    #[test]
    fn test_target_formula() {
        // 2*800 - 100 + 256 = 1756 -> 1792
        let target = compute_target(800.0, 100.0, 1000, &params());
        assert_eq!(target.samples_ahead, 1792);
        assert_eq!(target.index, (1000 + 1792) * 4);
    }

    #[test]
    fn test_target_fractional_averages_round_up() {
        let target = compute_target(735.2, 40.1, 0, &params());
        // 1470.4 - 40.1 + 256 = 1686.3 -> 1687 -> 1792
        assert_eq!(target.samples_ahead, 1792);
    }

    #[test]
    fn test_target_wraps_index() {
        let target = compute_target(800.0, 500.0, 47_800, &params());
        assert_eq!(target.index, ((47_800 + 1536) * 4) % 192_000);
        assert!(target.index < 192_000);
    }

    #[test]
    fn test_target_clamped_to_capacity() {
        let target = compute_target(100_000.0, 0.0, 1000, &params());
        assert!(target.clamped);
        assert_eq!(target.samples_ahead, 48_000);
        assert_eq!(target.bytes_ahead, 192_000);
        // A full ring ahead lands back on the anchor
        assert_eq!(target.index, 4000);
    }

    #[test]
    fn test_target_never_negative() {
        let target = compute_target(0.0, 10_000.0, 10, &params());
        assert_eq!(target.samples_ahead, 0);
        assert_eq!(target.index, 40);
        assert!(!target.clamped);
    }

    #[test]
    fn test_target_index_is_stride_aligned() {
        for anchor in [0usize, 1, 333, 47_999] {
            let target = compute_target(812.7, 93.3, anchor, &params());
            assert_eq!(target.index % 4, 0);
            assert_eq!(target.samples_ahead % 256, 0);
        }
    }
}
