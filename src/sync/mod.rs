//! Producer/consumer clock synchronization
//!
//! Estimates how fast the hardware drains the ring per simulation frame and
//! turns that into a write target for the current frame.

pub mod estimator;
pub mod target;

pub use estimator::{ema, EstimatorUpdate, LatencyEstimator, Measurement, DEFAULT_WINDOW_FRAMES};
pub use target::{compute_target, round_up_to_multiple, TargetParams, WriteTarget};
