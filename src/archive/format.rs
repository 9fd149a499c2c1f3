//! Binary layout of the frame archive.
//!
//! ```text
//! video_metadata.bin : u32 frame_count | frame_count x u32 frame_size
//! video_frames.bin   : frame_0 bytes | frame_1 bytes | ...
//! ```
//!
//! All integers are little-endian.

use super::storage::MemoryStorage;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

/// Default storage path of the metadata file.
pub const METADATA_FILE: &str = "/video_metadata.bin";

/// Default storage path of the concatenated frames file.
pub const FRAMES_FILE: &str = "/video_frames.bin";

/// Size of one encoded integer.
const WORD: u64 = 4;

/// Errors raised while authoring an archive.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A single frame does not fit a u32 size entry.
    #[error("frame of {len} bytes exceeds the 4 GiB per-frame limit")]
    FrameTooLarge { len: usize },
    /// The frame count does not fit the u32 header.
    #[error("archive cannot hold more than {} frames", u32::MAX)]
    TooManyFrames,
    /// Writing the archive files failed.
    #[error("failed to write archive: {0}")]
    Io(#[from] io::Error),
}

/// Exact metadata length implied by a frame count.
pub fn metadata_len(frame_count: u32) -> u64 {
    WORD + WORD * u64::from(frame_count)
}

/// Reads one little-endian `u32`.
pub(crate) fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut word = [0u8; 4];
    reader.read_exact(&mut word)?;
    Ok(u32::from_le_bytes(word))
}

/// Encodes a metadata file for the given frame sizes.
pub fn encode_metadata(sizes: &[u32]) -> Result<Vec<u8>, FormatError> {
    let count = u32::try_from(sizes.len()).map_err(|_| FormatError::TooManyFrames)?;
    let mut out = Vec::with_capacity(metadata_len(count) as usize);
    out.extend_from_slice(&count.to_le_bytes());
    for size in sizes {
        out.extend_from_slice(&size.to_le_bytes());
    }
    Ok(out)
}

/// Accumulates pre-encoded JPEG frames into an archive pair.
#[derive(Debug, Default, Clone)]
pub struct ArchiveWriter {
    sizes: Vec<u32>,
    frames: Vec<u8>,
}

impl ArchiveWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one frame payload.
    pub fn push(&mut self, frame: &[u8]) -> Result<(), FormatError> {
        let len =
            u32::try_from(frame.len()).map_err(|_| FormatError::FrameTooLarge { len: frame.len() })?;
        if self.sizes.len() == u32::MAX as usize {
            return Err(FormatError::TooManyFrames);
        }
        self.sizes.push(len);
        self.frames.extend_from_slice(frame);
        Ok(())
    }

    /// Number of frames pushed so far.
    pub fn frame_count(&self) -> usize {
        self.sizes.len()
    }

    /// Total payload bytes pushed so far.
    pub fn total_bytes(&self) -> usize {
        self.frames.len()
    }

    /// Returns `(metadata, frames)` file contents.
    pub fn into_parts(self) -> Result<(Vec<u8>, Vec<u8>), FormatError> {
        Ok((encode_metadata(&self.sizes)?, self.frames))
    }

    /// Writes both files into `dir` under the default names.
    pub fn write_to_dir(self, dir: &Path) -> Result<(), FormatError> {
        std::fs::create_dir_all(dir)?;
        let (metadata, frames) = self.into_parts()?;
        std::fs::write(dir.join(METADATA_FILE.trim_start_matches('/')), metadata)?;
        std::fs::write(dir.join(FRAMES_FILE.trim_start_matches('/')), frames)?;
        Ok(())
    }

    /// Places both files into an in-memory storage under the default names.
    pub fn into_storage(self) -> Result<MemoryStorage, FormatError> {
        let (metadata, frames) = self.into_parts()?;
        Ok(MemoryStorage::new()
            .with_file(METADATA_FILE, metadata)
            .with_file(FRAMES_FILE, frames))
    }
}
