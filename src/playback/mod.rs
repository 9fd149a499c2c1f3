//! Paced, looping playback over a loaded archive.
//!
//! Consumers poll the [`FrameStore`] on their own schedule; the [`Pacer`]
//! decides centrally when the cursor may advance, so heterogeneous
//! consumers share one playback timeline without coordinating.

mod clock;
mod handle;
mod pacer;
mod store;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use handle::{FrameFormat, FrameHandle, Resolution};
pub use pacer::{
    clamp_fps, clamp_frame_duration, interval_for_fps, Pacer, DEFAULT_FPS,
    DEFAULT_FRAME_DURATION_MS, MAX_FPS, MAX_FRAME_DURATION_MS, MIN_FPS, MIN_FRAME_DURATION_MS,
};
pub use store::{FrameStore, PlaybackStats};
