//! Video Loop Library
//!
//! Plays a pre-encoded sequence of JPEG frames from persistent storage in
//! an endless loop, serving them to independent consumers (snapshots,
//! multipart streams, periodic broadcasts) at a configurable cadence.
//!
//! # Architecture
//!
//! ```text
//! archive (storage → loader → index + buffer)
//!     ↓
//! playback (frame store ← pacer)
//!     ↓
//! consumers (snapshot, multipart stream, broadcaster)
//! ```
//!
//! # Design Principles
//!
//! - **Load once**: the archive is read into a single buffer at startup and
//!   never changes afterwards
//! - **Zero-copy**: handles borrow slices of the buffer directly
//! - **Central pacing**: consumers poll as often as they like; the store
//!   alone decides when the cursor advances
//! - **Resilient to bad input**: invalid rates are clamped, never rejected
//!
//! # Example
//!
//! ```no_run
//! use video_loop::{
//!     archive::{load_default, DirStorage, LoadLimits},
//!     playback::{Clock, FrameStore, MonotonicClock},
//! };
//!
//! let archive = load_default(&DirStorage::new("data"), LoadLimits::default()).unwrap();
//! let store = FrameStore::new(archive);
//! store.set_rate(15.0);
//!
//! let clock = MonotonicClock::new();
//! if let Some(frame) = store.poll(clock.now_ms()) {
//!     println!("frame {} ({} bytes)", frame.ordinal(), frame.len());
//!     store.release(frame);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod archive;
pub mod config;
pub mod consumers;
pub mod metrics;
pub mod playback;
#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types at crate root
pub use archive::{ArchiveWriter, DirStorage, LoadError, LoadLimits, LoadedArchive, Storage};
pub use config::FileConfig;
pub use consumers::{Broadcaster, FrameSink};
pub use playback::{Clock, FrameHandle, FrameStore, MonotonicClock, Pacer};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
