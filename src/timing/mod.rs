//! Frame timing: clock sources and the sleep-then-spin pacer

pub mod clock;
pub mod pacer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use pacer::{FramePacer, DEFAULT_SPIN_THRESHOLD};
