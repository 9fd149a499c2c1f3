//! Byte-oriented persistent storage abstraction.
//!
//! The loader only needs open/read/close semantics on two named paths,
//! so the host filesystem (or a flash partition mounted somewhere) and
//! in-memory fixtures can be swapped freely.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

/// An opened storage file together with its total length in bytes.
#[derive(Debug)]
pub struct OpenFile<R> {
    /// Sequential reader over the file contents.
    pub reader: R,
    /// Length reported by the storage layer.
    pub len: u64,
}

/// Trait for read-only storage backends.
///
/// Files are closed when the returned reader is dropped.
pub trait Storage {
    /// Reader type yielded by [`Storage::open`].
    type Reader: Read;

    /// Opens the file at `path` for reading.
    fn open(&self, path: &str) -> io::Result<OpenFile<Self::Reader>>;
}

/// Storage rooted at a directory, such as a flash filesystem mount point.
///
/// Paths are resolved relative to the root; a leading `/` is ignored so
/// device-style names like `/video_frames.bin` work unchanged.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Resolves archive paths under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a storage path to a host path.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Storage for DirStorage {
    type Reader = File;

    fn open(&self, path: &str) -> io::Result<OpenFile<File>> {
        let file = File::open(self.resolve(path))?;
        let len = file.metadata()?.len();
        Ok(OpenFile { reader: file, len })
    }
}

/// In-memory storage keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a file.
    pub fn insert(&mut self, path: impl Into<String>, contents: Vec<u8>) {
        self.files.insert(path.into(), contents);
    }

    /// Builder-style variant of [`MemoryStorage::insert`].
    pub fn with_file(mut self, path: impl Into<String>, contents: Vec<u8>) -> Self {
        self.insert(path, contents);
        self
    }
}

impl Storage for MemoryStorage {
    type Reader = Cursor<Vec<u8>>;

    fn open(&self, path: &str) -> io::Result<OpenFile<Self::Reader>> {
        let contents = self.files.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}"))
        })?;
        Ok(OpenFile {
            len: contents.len() as u64,
            reader: Cursor::new(contents.clone()),
        })
    }
}
