//! Frame type and record iteration.
//!
//! A [`Frame`] is one undecoded, newline-terminated chunk of the bus stream.
//! Usually it carries a single JSON record, but a frame taken in batch mode
//! (or injected by a caller) may hold several records joined by `\n`;
//! [`Frame::records`] yields them one by one.
//!
//! # Example
//!
//! ```
//! use ipnbus_client::protocol::Frame;
//!
//! let frame = Frame::from("{\"Version\":\"1.80\"}\n{\"State\":6}\n");
//! let records: Vec<&[u8]> = frame.records().collect();
//!
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[1], b"{\"State\":6}");
//! ```

use bytes::Bytes;

use super::DELIMITER;

/// One newline-delimited raw record (or batch of records) from the stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Create a frame from already-split bytes.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Get a reference to the raw bytes, including the trailing delimiter.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame and return the underlying `Bytes`.
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the frame holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check if the frame ends with the record delimiter.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.bytes.last() == Some(&DELIMITER)
    }

    /// Iterate over the records in this frame.
    ///
    /// Segments are split on `\n`, trimmed of ASCII whitespace (so `\r\n`
    /// line endings are tolerated), and blank segments are skipped.
    pub fn records(&self) -> Records<'_> {
        Records { rest: &self.bytes }
    }
}

impl From<Bytes> for Frame {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(Bytes::from(bytes))
    }
}

impl From<&'static str> for Frame {
    fn from(s: &'static str) -> Self {
        Self::new(Bytes::from_static(s.as_bytes()))
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Iterator over the non-blank records of a [`Frame`].
#[derive(Debug, Clone)]
pub struct Records<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Records<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while !self.rest.is_empty() {
            let (segment, rest) = match self.rest.iter().position(|&b| b == DELIMITER) {
                Some(pos) => (&self.rest[..pos], &self.rest[pos + 1..]),
                None => (self.rest, &self.rest[self.rest.len()..]),
            };
            self.rest = rest;

            let segment = segment.trim_ascii();
            if !segment.is_empty() {
                return Some(segment);
            }
        }
        None
    }
}
