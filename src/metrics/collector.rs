//! Metrics collection and registry.

use crate::playback::FrameStore;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of player state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Whether the archive loaded and playback is serving frames.
    pub playback_available: bool,
    /// Frames in the loaded archive.
    pub frame_count: usize,
    /// Size of the frame buffer in bytes.
    pub archive_bytes: usize,
    /// Current playback rate.
    pub fps: f64,
    /// Current minimum interval between frames.
    pub frame_interval_ms: u64,
    /// Total store polls.
    pub polls: u64,
    /// Polls that produced a frame.
    pub frames_emitted: u64,
    /// Open multipart stream connections.
    pub stream_clients: usize,
    /// Live broadcast sessions.
    pub broadcast_sessions: usize,
}

/// Prometheus metrics registry for playback monitoring.
pub struct MetricsRegistry {
    registry: Registry,
    // Serializes updates so counter diffs are applied once
    update_lock: Mutex<()>,

    // Archive metrics
    playback_available: IntGauge,
    frame_count: IntGauge,
    archive_bytes: IntGauge,

    // Pacing metrics
    fps: Gauge,
    frame_interval_ms: IntGauge,
    polls_total: IntCounter,
    frames_emitted_total: IntCounter,
    polls_skipped_total: IntCounter,

    // Consumer metrics
    stream_clients: IntGauge,
    broadcast_sessions: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all playback metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let playback_available = IntGauge::new(
            "video_loop_playback_available",
            "Whether the frame archive loaded (1=available, 0=disabled)",
        )?;
        let frame_count = IntGauge::new(
            "video_loop_frame_count",
            "Number of frames in the loaded archive",
        )?;
        let archive_bytes = IntGauge::new(
            "video_loop_archive_bytes",
            "Size of the in-memory frame buffer in bytes",
        )?;

        let fps = Gauge::new("video_loop_fps", "Configured playback rate in frames per second")?;
        let frame_interval_ms = IntGauge::new(
            "video_loop_frame_interval_ms",
            "Minimum milliseconds between emitted frames",
        )?;
        let polls_total = IntCounter::new(
            "video_loop_polls_total",
            "Total number of frame polls from all consumers",
        )?;
        let frames_emitted_total = IntCounter::new(
            "video_loop_frames_emitted_total",
            "Total number of frames emitted",
        )?;
        let polls_skipped_total = IntCounter::new(
            "video_loop_polls_skipped_total",
            "Polls that arrived before the next frame was due",
        )?;

        let stream_clients = IntGauge::new(
            "video_loop_stream_clients",
            "Open multipart stream connections",
        )?;
        let broadcast_sessions = IntGauge::new(
            "video_loop_broadcast_sessions",
            "Live broadcast sessions",
        )?;

        registry.register(Box::new(playback_available.clone()))?;
        registry.register(Box::new(frame_count.clone()))?;
        registry.register(Box::new(archive_bytes.clone()))?;
        registry.register(Box::new(fps.clone()))?;
        registry.register(Box::new(frame_interval_ms.clone()))?;
        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(frames_emitted_total.clone()))?;
        registry.register(Box::new(polls_skipped_total.clone()))?;
        registry.register(Box::new(stream_clients.clone()))?;
        registry.register(Box::new(broadcast_sessions.clone()))?;

        Ok(Self {
            registry,
            update_lock: Mutex::new(()),
            playback_available,
            frame_count,
            archive_bytes,
            fps,
            frame_interval_ms,
            polls_total,
            frames_emitted_total,
            polls_skipped_total,
            stream_clients,
            broadcast_sessions,
        })
    }

    /// Updates all metrics from a snapshot of player state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        let _guard = self.update_lock.lock().unwrap_or_else(PoisonError::into_inner);

        self.playback_available
            .set(if snapshot.playback_available { 1 } else { 0 });
        self.frame_count.set(snapshot.frame_count as i64);
        self.archive_bytes.set(snapshot.archive_bytes as i64);

        self.fps.set(snapshot.fps);
        self.frame_interval_ms.set(snapshot.frame_interval_ms as i64);

        // Counters only move forward, so add the difference
        advance_counter(&self.polls_total, snapshot.polls);
        advance_counter(&self.frames_emitted_total, snapshot.frames_emitted);
        advance_counter(
            &self.polls_skipped_total,
            snapshot.polls.saturating_sub(snapshot.frames_emitted),
        );

        self.stream_clients.set(snapshot.stream_clients as i64);
        self.broadcast_sessions.set(snapshot.broadcast_sessions as i64);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance_counter(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsSnapshot {
    /// Creates a snapshot from the current state of the player.
    pub fn from_components(
        store: Option<&FrameStore>,
        stream_clients: usize,
        broadcast_sessions: usize,
    ) -> Self {
        let mut snapshot = Self {
            stream_clients,
            broadcast_sessions,
            ..Default::default()
        };
        if let Some(store) = store {
            let stats = store.stats();
            snapshot.playback_available = true;
            snapshot.frame_count = store.frame_count();
            snapshot.archive_bytes = store.archive().buffer_len();
            snapshot.fps = f64::from(store.current_rate());
            snapshot.frame_interval_ms = store.current_interval().as_millis() as u64;
            snapshot.polls = stats.polls;
            snapshot.frames_emitted = stats.emitted;
        }
        snapshot
    }
}
