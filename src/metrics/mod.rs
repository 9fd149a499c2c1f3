//! Prometheus metrics for playback monitoring.
//!
//! # Metrics Exposed
//!
//! ## Archive Metrics
//! - `video_loop_playback_available` - Whether the archive loaded (1/0)
//! - `video_loop_frame_count` - Frames in the loaded archive
//! - `video_loop_archive_bytes` - Size of the frame buffer
//!
//! ## Pacing Metrics
//! - `video_loop_fps` - Configured playback rate
//! - `video_loop_frame_interval_ms` - Minimum interval between frames
//! - `video_loop_polls_total` - Polls from all consumers
//! - `video_loop_frames_emitted_total` - Frames emitted
//! - `video_loop_polls_skipped_total` - Polls answered with "not yet"
//!
//! ## Consumer Metrics
//! - `video_loop_stream_clients` - Open multipart stream connections
//! - `video_loop_broadcast_sessions` - Live broadcast sessions

mod collector;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
