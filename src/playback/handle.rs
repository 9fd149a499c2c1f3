//! Frame handles handed to consumers.

use bytes::Bytes;
use std::time::Duration;

/// Encoding of the bytes referenced by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Baseline JPEG.
    Jpeg,
}

impl FrameFormat {
    /// MIME type for HTTP responses and multipart parts.
    pub fn mime(&self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Nominal dimensions attached to every emitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// A transient, non-owning view of one frame.
///
/// The bytes belong to the store's frame buffer; the handle only borrows
/// them. Use it within the call that obtained it and then [`release`] it.
///
/// [`release`]: FrameHandle::release
pub struct FrameHandle<'a> {
    data: &'a [u8],
    arena: &'a Bytes,
    ordinal: usize,
    resolution: Resolution,
    format: FrameFormat,
    capture_time: Duration,
}

impl<'a> FrameHandle<'a> {
    pub(crate) fn new(
        data: &'a [u8],
        arena: &'a Bytes,
        ordinal: usize,
        resolution: Resolution,
        capture_time: Duration,
    ) -> Self {
        Self {
            data,
            arena,
            ordinal,
            resolution,
            format: FrameFormat::Jpeg,
            capture_time,
        }
    }

    /// The frame bytes.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Frame length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame has no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Position of the frame in the archive.
    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Nominal width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    /// Nominal height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    /// Encoding of the frame bytes.
    #[inline]
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Emission time on the store's clock.
    #[inline]
    pub fn capture_time(&self) -> Duration {
        self.capture_time
    }

    /// Emission time in whole milliseconds.
    pub fn capture_time_ms(&self) -> u64 {
        self.capture_time.as_millis() as u64
    }

    /// Reference-counted view of the same bytes, for handing to async writers.
    ///
    /// No bytes are copied; the returned value keeps the frame buffer alive.
    pub fn share(&self) -> Bytes {
        self.arena.slice_ref(self.data)
    }

    /// Releases the handle. The frame buffer is untouched.
    pub fn release(self) {}
}

impl std::fmt::Debug for FrameHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHandle")
            .field("ordinal", &self.ordinal)
            .field("len", &self.data.len())
            .field("width", &self.resolution.width)
            .field("height", &self.resolution.height)
            .field("format", &self.format)
            .field("capture_time", &self.capture_time)
            .finish()
    }
}
