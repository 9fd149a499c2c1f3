//! One-shot archive loader.
//!
//! Parses the metadata file into a [`FrameIndex`] and bulk-reads the frames
//! file into a single contiguous buffer. Loading is all-or-nothing: every
//! error path drops whatever was allocated so far and no partially built
//! archive escapes.

use super::format::{self, FRAMES_FILE, METADATA_FILE};
use super::index::{FrameIndex, FrameSpan};
use super::storage::Storage;
use bytes::Bytes;
use std::fmt;
use std::io::{self, BufReader, Read};
use thiserror::Error;

/// Which half of the archive an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivePart {
    /// The frame-size table.
    Metadata,
    /// The concatenated JPEG data.
    Frames,
}

impl fmt::Display for ArchivePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchivePart::Metadata => f.write_str("metadata file"),
            ArchivePart::Frames => f.write_str("frames file"),
        }
    }
}

/// Errors that abort archive loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// An archive file is missing or cannot be opened or read.
    #[error("archive file {path} is unavailable: {source}")]
    ArchiveUnavailable {
        /// Storage path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The metadata declares zero frames.
    #[error("archive contains no frames")]
    EmptyArchive,
    /// A file is shorter than its declared contents.
    #[error("{part} truncated: expected {expected} bytes, found {actual}")]
    TruncatedArchive {
        /// Which file is short.
        part: ArchivePart,
        /// Bytes required.
        expected: u64,
        /// Bytes available.
        actual: u64,
    },
    /// The frame buffer or index could not be allocated.
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: u64 },
}

impl LoadError {
    fn unavailable(path: &str, source: io::Error) -> Self {
        LoadError::ArchiveUnavailable {
            path: path.to_string(),
            source,
        }
    }
}

/// Memory limits applied while loading.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadLimits {
    /// Largest frames file accepted, in bytes. `None` means unbounded.
    pub max_buffer_bytes: Option<u64>,
}

/// Storage paths of the two archive files.
#[derive(Debug, Clone)]
pub struct ArchivePaths {
    /// Path of the frame-size table.
    pub metadata: String,
    /// Path of the frame data.
    pub frames: String,
}

impl Default for ArchivePaths {
    fn default() -> Self {
        Self {
            metadata: METADATA_FILE.to_string(),
            frames: FRAMES_FILE.to_string(),
        }
    }
}

/// A fully loaded, immutable frame archive.
#[derive(Debug, Clone)]
pub struct LoadedArchive {
    index: FrameIndex,
    buffer: Bytes,
}

impl LoadedArchive {
    /// Assembles an archive from parts, checking every span fits the buffer.
    pub fn new(index: FrameIndex, buffer: Bytes) -> Result<Self, LoadError> {
        if index.is_empty() {
            return Err(LoadError::EmptyArchive);
        }
        if index.total_bytes() > buffer.len() as u64 {
            return Err(LoadError::TruncatedArchive {
                part: ArchivePart::Frames,
                expected: index.total_bytes(),
                actual: buffer.len() as u64,
            });
        }
        Ok(Self { index, buffer })
    }

    /// The frame index.
    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    /// The whole frame buffer.
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Number of frames; always at least one.
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    /// Length of the frame buffer in bytes.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    /// Span of frame `ordinal`.
    pub fn span(&self, ordinal: usize) -> Option<FrameSpan> {
        self.index.get(ordinal)
    }

    /// Bytes of frame `ordinal`, borrowed from the buffer.
    pub fn frame(&self, ordinal: usize) -> Option<&[u8]> {
        self.index.get(ordinal).map(|span| &self.buffer[span.range()])
    }
}

/// Loads the archive from the default paths.
pub fn load_default<S: Storage>(storage: &S, limits: LoadLimits) -> Result<LoadedArchive, LoadError> {
    load(storage, &ArchivePaths::default(), limits)
}

/// Loads an archive from `storage`.
pub fn load<S: Storage>(
    storage: &S,
    paths: &ArchivePaths,
    limits: LoadLimits,
) -> Result<LoadedArchive, LoadError> {
    tracing::info!(
        metadata = %paths.metadata,
        frames = %paths.frames,
        "Loading frame archive"
    );

    let index = read_index(storage, &paths.metadata)?;
    let buffer = read_frames(storage, &paths.frames, &index, limits)?;
    let archive = LoadedArchive::new(index, buffer)?;

    tracing::info!(
        frame_count = archive.frame_count(),
        buffer_bytes = archive.buffer_len(),
        "Frame archive loaded"
    );
    Ok(archive)
}

fn read_index<S: Storage>(storage: &S, path: &str) -> Result<FrameIndex, LoadError> {
    let file = storage
        .open(path)
        .map_err(|e| LoadError::unavailable(path, e))?;
    let file_len = file.len;
    let mut reader = BufReader::new(file.reader);

    let truncated = |expected: u64| LoadError::TruncatedArchive {
        part: ArchivePart::Metadata,
        expected,
        actual: file_len,
    };
    let map_read = |e: io::Error, expected: u64| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            truncated(expected)
        } else {
            LoadError::unavailable(path, e)
        }
    };

    let frame_count = format::read_u32(&mut reader).map_err(|e| map_read(e, format::metadata_len(0)))?;
    tracing::debug!(frame_count, "Read metadata header");
    if frame_count == 0 {
        return Err(LoadError::EmptyArchive);
    }

    let expected = format::metadata_len(frame_count);
    if file_len < expected {
        return Err(truncated(expected));
    }
    if file_len > expected {
        tracing::warn!(
            surplus = file_len - expected,
            "Ignoring trailing bytes in metadata file"
        );
    }

    let mut index = FrameIndex::try_with_capacity(frame_count as usize).map_err(|_| {
        LoadError::OutOfMemory {
            requested: u64::from(frame_count) * std::mem::size_of::<FrameSpan>() as u64,
        }
    })?;
    for _ in 0..frame_count {
        let size = format::read_u32(&mut reader).map_err(|e| map_read(e, expected))?;
        index.push(size);
    }

    Ok(index)
}

fn read_frames<S: Storage>(
    storage: &S,
    path: &str,
    index: &FrameIndex,
    limits: LoadLimits,
) -> Result<Bytes, LoadError> {
    let file = storage
        .open(path)
        .map_err(|e| LoadError::unavailable(path, e))?;
    let len = file.len;
    tracing::info!(buffer_bytes = len, "Total frame buffer size");

    if len < index.total_bytes() {
        return Err(LoadError::TruncatedArchive {
            part: ArchivePart::Frames,
            expected: index.total_bytes(),
            actual: len,
        });
    }
    if let Some(max) = limits.max_buffer_bytes {
        if len > max {
            tracing::error!(requested = len, budget = max, "Frames file exceeds memory budget");
            return Err(LoadError::OutOfMemory { requested: len });
        }
    }

    let capacity = usize::try_from(len).map_err(|_| LoadError::OutOfMemory { requested: len })?;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(capacity)
        .map_err(|_| LoadError::OutOfMemory { requested: len })?;

    let read = file
        .reader
        .take(len)
        .read_to_end(&mut buffer)
        .map_err(|e| LoadError::unavailable(path, e))?;
    if (read as u64) < len {
        return Err(LoadError::TruncatedArchive {
            part: ArchivePart::Frames,
            expected: len,
            actual: read as u64,
        });
    }
    if len > index.total_bytes() {
        tracing::warn!(
            surplus = len - index.total_bytes(),
            "Frames file is longer than the declared frame sizes"
        );
    }

    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::format::{encode_metadata, ArchiveWriter};
    use crate::archive::storage::MemoryStorage;
    use proptest::prelude::*;

    fn storage_with(metadata: Vec<u8>, frames: Vec<u8>) -> MemoryStorage {
        MemoryStorage::new()
            .with_file(METADATA_FILE, metadata)
            .with_file(FRAMES_FILE, frames)
    }

    fn sample_storage() -> MemoryStorage {
        let mut writer = ArchiveWriter::new();
        writer.push(&[1u8; 100]).unwrap();
        writer.push(&[2u8; 200]).unwrap();
        writer.push(&[3u8; 150]).unwrap();
        writer.into_storage().unwrap()
    }

    #[test]
    fn test_load_valid_archive() {
        let archive = load_default(&sample_storage(), LoadLimits::default()).unwrap();

        assert_eq!(archive.frame_count(), 3);
        assert_eq!(archive.buffer_len(), 450);
        assert_eq!(archive.frame(0).unwrap(), &[1u8; 100][..]);
        assert_eq!(archive.frame(1).unwrap(), &[2u8; 200][..]);
        assert_eq!(archive.frame(2).unwrap(), &[3u8; 150][..]);
        assert!(archive.frame(3).is_none());
    }

    #[test]
    fn test_missing_metadata_is_unavailable() {
        let storage = MemoryStorage::new().with_file(FRAMES_FILE, vec![0; 4]);
        let err = load_default(&storage, LoadLimits::default()).unwrap_err();
        assert!(matches!(err, LoadError::ArchiveUnavailable { ref path, .. } if path == METADATA_FILE));
    }

    #[test]
    fn test_missing_frames_is_unavailable() {
        let storage = MemoryStorage::new().with_file(METADATA_FILE, encode_metadata(&[4]).unwrap());
        let err = load_default(&storage, LoadLimits::default()).unwrap_err();
        assert!(matches!(err, LoadError::ArchiveUnavailable { ref path, .. } if path == FRAMES_FILE));
    }

    #[test]
    fn test_zero_frames_is_empty() {
        let storage = storage_with(encode_metadata(&[]).unwrap(), Vec::new());
        let err = load_default(&storage, LoadLimits::default()).unwrap_err();
        assert!(matches!(err, LoadError::EmptyArchive));
    }

    #[test]
    fn test_short_metadata_is_truncated() {
        let mut metadata = encode_metadata(&[10, 10]).unwrap();
        metadata.truncate(6);
        let storage = storage_with(metadata, vec![0; 20]);

        let err = load_default(&storage, LoadLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::TruncatedArchive {
                part: ArchivePart::Metadata,
                expected: 12,
                actual: 6
            }
        ));
    }

    #[test]
    fn test_huge_frame_count_rejected_before_allocation() {
        let storage = storage_with(u32::MAX.to_le_bytes().to_vec(), Vec::new());
        let err = load_default(&storage, LoadLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::TruncatedArchive {
                part: ArchivePart::Metadata,
                ..
            }
        ));
    }

    #[test]
    fn test_short_frames_is_truncated() {
        let storage = storage_with(encode_metadata(&[100, 200]).unwrap(), vec![0; 250]);
        let err = load_default(&storage, LoadLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::TruncatedArchive {
                part: ArchivePart::Frames,
                expected: 300,
                actual: 250
            }
        ));
    }

    #[test]
    fn test_surplus_frame_bytes_accepted() {
        let storage = storage_with(encode_metadata(&[2]).unwrap(), vec![9; 5]);
        let archive = load_default(&storage, LoadLimits::default()).unwrap();
        assert_eq!(archive.frame(0).unwrap(), &[9, 9]);
        assert_eq!(archive.buffer_len(), 5);
    }

    #[test]
    fn test_memory_budget_exceeded() {
        let limits = LoadLimits {
            max_buffer_bytes: Some(400),
        };
        let err = load_default(&sample_storage(), limits).unwrap_err();
        assert!(matches!(err, LoadError::OutOfMemory { requested: 450 }));
    }

    #[test]
    fn test_custom_paths() {
        let paths = ArchivePaths {
            metadata: "/clip/meta.bin".to_string(),
            frames: "/clip/frames.bin".to_string(),
        };
        let storage = MemoryStorage::new()
            .with_file("/clip/meta.bin", encode_metadata(&[3]).unwrap())
            .with_file("/clip/frames.bin", vec![7, 7, 7]);

        let archive = load(&storage, &paths, LoadLimits::default()).unwrap();
        assert_eq!(archive.frame_count(), 1);
    }

    #[test]
    fn test_assemble_rejects_short_buffer() {
        let index = FrameIndex::from_sizes(&[10]);
        let err = LoadedArchive::new(index, Bytes::from_static(&[0; 5])).unwrap_err();
        assert!(matches!(err, LoadError::TruncatedArchive { .. }));
    }

    proptest! {
        #[test]
        fn valid_archives_load_with_bounded_spans(sizes in prop::collection::vec(0usize..512, 1..32)) {
            let mut writer = ArchiveWriter::new();
            for (i, &size) in sizes.iter().enumerate() {
                writer.push(&vec![i as u8; size]).unwrap();
            }
            let archive = load_default(&writer.into_storage().unwrap(), LoadLimits::default()).unwrap();

            prop_assert_eq!(archive.frame_count(), sizes.len());
            prop_assert_eq!(archive.buffer_len(), sizes.iter().sum::<usize>());
            for (i, span) in archive.index().iter().enumerate() {
                prop_assert!(span.end() <= archive.buffer_len() as u64);
                prop_assert_eq!(archive.frame(i).unwrap().len(), sizes[i]);
            }
        }
    }
}
