//! Frame index: ordinal to `(offset, size)` lookup.

use std::collections::TryReserveError;
use std::ops::Range;

/// Location of one frame inside the frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpan {
    /// Byte offset from the start of the buffer.
    pub offset: u64,
    /// Frame length in bytes.
    pub len: u32,
}

impl FrameSpan {
    /// One past the last byte of the frame.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.len)
    }

    /// Byte range for slicing a buffer already checked to cover this span.
    #[inline]
    pub(crate) fn range(&self) -> Range<usize> {
        self.offset as usize..self.end() as usize
    }
}

/// Prefix-sum index over frame sizes.
///
/// `offset_0 = 0` and `offset_i = offset_{i-1} + size_{i-1}`.
/// Built once at load time and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameIndex {
    spans: Vec<FrameSpan>,
    total: u64,
}

impl FrameIndex {
    /// Allocates room for `frames` entries without aborting on failure.
    pub(crate) fn try_with_capacity(frames: usize) -> Result<Self, TryReserveError> {
        let mut spans = Vec::new();
        spans.try_reserve_exact(frames)?;
        Ok(Self { spans, total: 0 })
    }

    /// Appends the next frame size.
    pub(crate) fn push(&mut self, size: u32) {
        self.spans.push(FrameSpan {
            offset: self.total,
            len: size,
        });
        self.total += u64::from(size);
    }

    /// Builds an index from a list of sizes.
    pub fn from_sizes(sizes: &[u32]) -> Self {
        let mut index = Self {
            spans: Vec::with_capacity(sizes.len()),
            total: 0,
        };
        for &size in sizes {
            index.push(size);
        }
        index
    }

    /// Span of frame `ordinal`, if it exists.
    #[inline]
    pub fn get(&self, ordinal: usize) -> Option<FrameSpan> {
        self.spans.get(ordinal).copied()
    }

    /// Number of frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the index holds no frames.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Sum of all frame sizes.
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Iterates spans in playback order.
    pub fn iter(&self) -> impl Iterator<Item = FrameSpan> + '_ {
        self.spans.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prefix_sums() {
        let index = FrameIndex::from_sizes(&[100, 200, 150]);

        assert_eq!(index.len(), 3);
        assert_eq!(index.total_bytes(), 450);
        assert_eq!(index.get(0), Some(FrameSpan { offset: 0, len: 100 }));
        assert_eq!(index.get(1), Some(FrameSpan { offset: 100, len: 200 }));
        assert_eq!(index.get(2), Some(FrameSpan { offset: 300, len: 150 }));
        assert_eq!(index.get(3), None);
    }

    #[test]
    fn test_zero_length_frames_share_offset() {
        let index = FrameIndex::from_sizes(&[0, 0, 5]);
        assert_eq!(index.get(1).unwrap().offset, 0);
        assert_eq!(index.get(2).unwrap().range(), 0..5);
    }

    proptest! {
        #[test]
        fn spans_are_contiguous_and_bounded(sizes in prop::collection::vec(0u32..10_000, 1..64)) {
            let index = FrameIndex::from_sizes(&sizes);
            let total: u64 = sizes.iter().map(|&s| u64::from(s)).sum();

            prop_assert_eq!(index.total_bytes(), total);
            let mut expected_offset = 0u64;
            for span in index.iter() {
                prop_assert_eq!(span.offset, expected_offset);
                prop_assert!(span.end() <= total);
                expected_offset = span.end();
            }
        }
    }
}
