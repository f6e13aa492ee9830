//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so completed frames are split off and frozen
//! without copying. The buffer remembers the position of the last delimiter
//! it has seen, so completeness checks are O(1) and each appended chunk is
//! scanned once.
//!
//! # Example
//!
//! ```
//! use ipnbus_client::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! buffer.append(b"{\"Version\":");
//! assert!(!buffer.is_frame_complete());
//!
//! buffer.append(b"\"1.80\"}\n");
//! assert!(buffer.is_frame_complete());
//!
//! let frame = buffer.take_frame();
//! assert_eq!(frame.as_bytes(), b"{\"Version\":\"1.80\"}\n");
//! assert!(buffer.is_empty());
//! ```

use bytes::BytesMut;
use serde::Deserialize;

use super::{Frame, DELIMITER};
use crate::error::{BusError, Result};

/// Default maximum size of a single incomplete record (16 MiB).
///
/// Netmap notifications on large tailnets can run to several megabytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Initial buffer capacity.
const INITIAL_CAPACITY: usize = 16 * 1024;

/// How [`FrameBuffer::push`] cuts the buffered bytes into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// One frame per newline-terminated record.
    #[default]
    Record,
    /// One frame holding every complete record currently buffered.
    ///
    /// A burst of records then occupies a single queue slot.
    Batch,
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Accumulated bytes from stream reads.
    buffer: BytesMut,
    /// Offset of the last delimiter in `buffer`, if any.
    last_delimiter: Option<usize>,
    /// How `push` splits frames.
    mode: FrameMode,
    /// Maximum bytes allowed for an incomplete record.
    max_frame_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    pub fn new() -> Self {
        Self::with_options(FrameMode::Record, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom mode and record size limit.
    pub fn with_options(mode: FrameMode, max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            last_delimiter: None,
            mode,
            max_frame_size,
        }
    }

    /// Append a received chunk to the buffer.
    ///
    /// Does not enforce `max_frame_size`; [`push`](Self::push) does.
    pub fn append(&mut self, chunk: &[u8]) {
        if let Some(pos) = chunk.iter().rposition(|&b| b == DELIMITER) {
            self.last_delimiter = Some(self.buffer.len() + pos);
        }
        self.buffer.extend_from_slice(chunk);
    }

    /// Check whether at least one newline-terminated record is buffered.
    #[inline]
    pub fn is_frame_complete(&self) -> bool {
        self.last_delimiter.is_some()
    }

    /// Remove and return the oldest complete record, delimiter included.
    ///
    /// Must only be called when [`is_frame_complete`](Self::is_frame_complete)
    /// is true; doing otherwise is a bug in the caller.
    pub fn take_frame(&mut self) -> Frame {
        debug_assert!(
            self.is_frame_complete(),
            "take_frame called without a complete frame"
        );
        let Some(last) = self.last_delimiter else {
            return Frame::default();
        };

        let end = self.buffer[..=last]
            .iter()
            .position(|&b| b == DELIMITER)
            .unwrap_or(last)
            + 1;
        let frame = Frame::new(self.buffer.split_to(end).freeze());

        self.last_delimiter = last.checked_sub(end);
        frame
    }

    /// Remove and return every complete record as a single frame.
    ///
    /// Same contract as [`take_frame`](Self::take_frame).
    pub fn take_batch(&mut self) -> Frame {
        debug_assert!(
            self.is_frame_complete(),
            "take_batch called without a complete frame"
        );
        let Some(last) = self.last_delimiter.take() else {
            return Frame::default();
        };

        Frame::new(self.buffer.split_to(last + 1).freeze())
    }

    /// Append a chunk and extract all complete frames.
    ///
    /// Frames are cut according to the buffer's [`FrameMode`]. Partial data
    /// stays buffered for the next push.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Protocol` if the incomplete remainder grows past
    /// the maximum record size. The remainder is discarded; frames completed
    /// by this chunk are lost with it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.append(chunk);

        let mut frames = Vec::new();
        while self.is_frame_complete() {
            let frame = match self.mode {
                FrameMode::Record => self.take_frame(),
                FrameMode::Batch => self.take_batch(),
            };
            frames.push(frame);
        }

        if self.buffer.len() > self.max_frame_size {
            let size = self.buffer.len();
            self.clear();
            return Err(BusError::Protocol(format!(
                "Record size {} exceeds maximum {}",
                size, self.max_frame_size
            )));
        }

        Ok(frames)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_delimiter = None;
    }

    /// The frame mode used by `push`.
    pub fn mode(&self) -> FrameMode {
        self.mode
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
