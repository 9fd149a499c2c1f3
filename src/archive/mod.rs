//! Frame archive on persistent storage.
//!
//! An archive is a pair of files produced out-of-band: a metadata file
//! holding the frame count and per-frame sizes, and a frames file holding
//! the concatenated JPEG payloads. The archive is read once at startup and
//! treated as immutable afterwards.

mod format;
mod index;
mod loader;
mod storage;

pub use format::{encode_metadata, metadata_len, ArchiveWriter, FormatError, FRAMES_FILE, METADATA_FILE};
pub use index::{FrameIndex, FrameSpan};
pub use loader::{load, load_default, ArchivePart, ArchivePaths, LoadError, LoadLimits, LoadedArchive};
pub use storage::{DirStorage, MemoryStorage, OpenFile, Storage};
