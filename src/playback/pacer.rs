//! Emission pacing.
//!
//! The pacer decides whether enough time has passed since the last emitted
//! frame, independently of how often consumers poll. Invalid rates are
//! clamped rather than rejected so bad configuration never stops playback.

use std::time::Duration;

/// Rate used when the requested rate is non-positive or not a number.
pub const DEFAULT_FPS: f32 = 10.0;

/// Slowest accepted rate.
pub const MIN_FPS: f32 = 0.1;

/// Fastest accepted rate.
pub const MAX_FPS: f32 = 100.0;

/// Frame duration matching [`DEFAULT_FPS`].
pub const DEFAULT_FRAME_DURATION_MS: u64 = 100;

/// Frame duration matching [`MAX_FPS`].
pub const MIN_FRAME_DURATION_MS: u64 = 10;

/// Frame duration matching [`MIN_FPS`].
pub const MAX_FRAME_DURATION_MS: u64 = 10_000;

/// Normalizes a requested rate into `[MIN_FPS, MAX_FPS]`.
pub fn clamp_fps(fps: f32) -> f32 {
    if fps.is_nan() || fps <= 0.0 {
        DEFAULT_FPS
    } else {
        fps.clamp(MIN_FPS, MAX_FPS)
    }
}

/// Converts a rate into a whole-millisecond interval, never zero.
pub fn interval_for_fps(fps: f32) -> u64 {
    let fps = clamp_fps(fps);
    ((1000.0 / fps).round() as u64).max(1)
}

/// Normalizes a requested frame duration in milliseconds.
pub fn clamp_frame_duration(ms: u64) -> u64 {
    if ms == 0 {
        DEFAULT_FRAME_DURATION_MS
    } else {
        ms.clamp(MIN_FRAME_DURATION_MS, MAX_FRAME_DURATION_MS)
    }
}

/// Minimum-interval gate over a single "last emission" timestamp.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval_ms: u64,
    last_emission_ms: Option<u64>,
}

impl Pacer {
    /// Creates a pacer at the given rate.
    pub fn with_rate(fps: f32) -> Self {
        Self {
            interval_ms: interval_for_fps(fps),
            last_emission_ms: None,
        }
    }

    /// Creates a pacer with the given frame duration.
    pub fn with_frame_duration(ms: u64) -> Self {
        Self {
            interval_ms: clamp_frame_duration(ms),
            last_emission_ms: None,
        }
    }

    /// Minimum time between emissions.
    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Current interval in whole milliseconds.
    #[inline]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Effective rate implied by the current interval.
    pub fn rate(&self) -> f32 {
        1000.0 / self.interval_ms as f32
    }

    /// Recomputes the interval as `1000ms / fps`, clamping invalid input.
    pub fn set_rate(&mut self, fps: f32) {
        let clamped = clamp_fps(fps);
        if clamped != fps {
            tracing::warn!(requested = fps, applied = clamped, "Frame rate out of range, clamped");
        }
        self.interval_ms = interval_for_fps(clamped);
    }

    /// Sets the interval directly, clamping invalid input.
    pub fn set_frame_duration(&mut self, ms: u64) {
        let clamped = clamp_frame_duration(ms);
        if clamped != ms {
            tracing::warn!(requested = ms, applied = clamped, "Frame duration out of range, clamped");
        }
        self.interval_ms = clamped;
    }

    /// Time of the last emission, if any.
    pub fn last_emission_ms(&self) -> Option<u64> {
        self.last_emission_ms
    }

    /// Returns `true` and records `now_ms` if an emission is due.
    ///
    /// The first call is always due. A `now_ms` earlier than the last
    /// emission counts as "not yet".
    pub fn try_fire(&mut self, now_ms: u64) -> bool {
        if let Some(last) = self.last_emission_ms {
            if now_ms < last || now_ms - last < self.interval_ms {
                return false;
            }
        }
        self.last_emission_ms = Some(now_ms);
        true
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::with_frame_duration(DEFAULT_FRAME_DURATION_MS)
    }
}
