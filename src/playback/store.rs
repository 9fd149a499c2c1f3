//! The frame store: loaded archive plus a shared playback cursor.

use super::handle::{FrameHandle, Resolution};
use super::pacer::Pacer;
use crate::archive::{self, ArchivePaths, LoadError, LoadLimits, LoadedArchive, Storage};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Poll counters since the store was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Total calls to [`FrameStore::poll`].
    pub polls: u64,
    /// Polls that produced a frame.
    pub emitted: u64,
}

impl PlaybackStats {
    /// Polls that returned "not yet".
    pub fn skipped(&self) -> u64 {
        self.polls - self.emitted
    }
}

/// Cursor and pacing state, mutated only under the store's lock.
#[derive(Debug)]
struct Playback {
    pacer: Pacer,
    cursor: usize,
    stats: PlaybackStats,
}

/// Owns the frame buffer and index and serves paced, looping playback.
///
/// The archive is immutable and read without locking. The cursor and the
/// last-emission time sit behind a single mutex so the check-and-advance
/// in [`poll`](FrameStore::poll) is atomic across concurrent consumers.
#[derive(Debug)]
pub struct FrameStore {
    archive: LoadedArchive,
    resolution: Resolution,
    playback: Mutex<Playback>,
}

impl FrameStore {
    /// Creates a store at the default rate, starting from frame 0.
    pub fn new(archive: LoadedArchive) -> Self {
        Self {
            archive,
            resolution: Resolution::default(),
            playback: Mutex::new(Playback {
                pacer: Pacer::default(),
                cursor: 0,
                stats: PlaybackStats::default(),
            }),
        }
    }

    /// Loads an archive from storage and wraps it in a store.
    pub fn open<S: Storage>(
        storage: &S,
        paths: &ArchivePaths,
        limits: LoadLimits,
    ) -> Result<Self, LoadError> {
        archive::load(storage, paths, limits).map(Self::new)
    }

    /// Replaces the pacer.
    pub fn with_pacer(self, pacer: Pacer) -> Self {
        self.lock().pacer = pacer;
        self
    }

    /// Sets the nominal resolution reported on handles.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Playback> {
        // Playback state stays consistent even if a holder panicked.
        self.playback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The loaded archive.
    pub fn archive(&self) -> &LoadedArchive {
        &self.archive
    }

    /// Number of frames in the loop.
    pub fn frame_count(&self) -> usize {
        self.archive.frame_count()
    }

    /// Nominal resolution of emitted frames.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Minimum time between successive cursor advances.
    pub fn current_interval(&self) -> Duration {
        self.lock().pacer.interval()
    }

    /// Effective frames per second.
    pub fn current_rate(&self) -> f32 {
        self.lock().pacer.rate()
    }

    /// Sets the playback rate; invalid rates are clamped.
    pub fn set_rate(&self, fps: f32) {
        let mut playback = self.lock();
        playback.pacer.set_rate(fps);
        tracing::info!(
            fps = playback.pacer.rate(),
            interval_ms = playback.pacer.interval_ms(),
            "Playback rate updated"
        );
    }

    /// Sets the frame duration in milliseconds; invalid values are clamped.
    pub fn set_frame_duration(&self, ms: u64) {
        let mut playback = self.lock();
        playback.pacer.set_frame_duration(ms);
        tracing::info!(
            fps = playback.pacer.rate(),
            interval_ms = playback.pacer.interval_ms(),
            "Playback frame duration updated"
        );
    }

    /// Ordinal of the next frame to emit.
    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    /// Poll counters.
    pub fn stats(&self) -> PlaybackStats {
        self.lock().stats
    }

    /// Returns the current frame if the pacer allows an emission at `now_ms`.
    ///
    /// `None` means "not yet" and is not an error. A successful poll
    /// advances the cursor by exactly one frame, wrapping after the last,
    /// regardless of how long it has been since the previous emission.
    pub fn poll(&self, now_ms: u64) -> Option<FrameHandle<'_>> {
        let ordinal = {
            let mut playback = self.lock();
            playback.stats.polls += 1;
            if !playback.pacer.try_fire(now_ms) {
                return None;
            }
            let ordinal = playback.cursor;
            playback.cursor = (ordinal + 1) % self.archive.frame_count();
            playback.stats.emitted += 1;
            ordinal
        };

        let data = self.archive.frame(ordinal)?;
        tracing::trace!(ordinal, len = data.len(), now_ms, "Emitting frame");
        Some(FrameHandle::new(
            data,
            self.archive.buffer(),
            ordinal,
            self.resolution,
            Duration::from_millis(now_ms),
        ))
    }

    /// Releases a handle obtained from [`poll`](FrameStore::poll).
    ///
    /// Only the handle itself is discarded; the frame buffer is untouched.
    pub fn release(&self, handle: FrameHandle<'_>) {
        handle.release();
    }
}
