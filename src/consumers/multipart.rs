//! `multipart/x-mixed-replace` framing for MJPEG streams.

use crate::playback::FrameHandle;
use bytes::Bytes;

/// Part boundary used on every stream.
pub const BOUNDARY: &str = "123456789000000000000987654321";

/// `Content-Type` header value announcing the stream.
pub const CONTENT_TYPE: &str =
    "multipart/x-mixed-replace; boundary=123456789000000000000987654321";

/// Header preceding one part of `len` bytes.
pub fn part_header(mime: &str, len: usize) -> String {
    format!("\r\n--{BOUNDARY}\r\nContent-Type: {mime}\r\nContent-Length: {len}\r\n\r\n")
}

/// Encodes a frame as `[header, body]` chunks without copying the body.
pub fn encode_part(frame: &FrameHandle<'_>) -> [Bytes; 2] {
    [
        Bytes::from(part_header(frame.format().mime(), frame.len())),
        frame.share(),
    ]
}
