//! Protocol module - newline-delimited framing.
//!
//! The bus is a stream of JSON records, each terminated by `\n`:
//! - [`FrameBuffer`] accumulates partial reads and cuts complete frames
//! - [`Frame`] carries the raw bytes and iterates over the records inside

mod frame;
mod frame_buffer;

pub use frame::{Frame, Records};
pub use frame_buffer::{FrameBuffer, FrameMode, DEFAULT_MAX_FRAME_SIZE};

/// Record delimiter on the wire.
pub const DELIMITER: u8 = b'\n';
