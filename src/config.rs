//! Dispatcher configuration.
//!
//! All values are fixed when a dispatcher is built. [`BusConfig`] derives
//! `Deserialize` so a host application can embed it in its own config file;
//! missing fields take their defaults and durations are given in
//! milliseconds:
//!
//! ```
//! use ipnbus_client::BusConfig;
//!
//! let config: BusConfig =
//!     serde_json::from_str(r#"{ "capacity": 64, "poll_interval_ms": 50 }"#).unwrap();
//!
//! assert_eq!(config.capacity, 64);
//! assert_eq!(config.poll_interval, std::time::Duration::from_millis(50));
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::backpressure::DEFAULT_CAPACITY;
use crate::protocol::{FrameMode, DEFAULT_MAX_FRAME_SIZE};

/// Default interval between drain-loop polls of an empty queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default size of the transport read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for a [`StreamDispatcher`](crate::StreamDispatcher).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum frames buffered between reader and drain loop.
    pub capacity: usize,
    /// How long the drain loop sleeps when the queue is empty.
    #[serde(rename = "poll_interval_ms", deserialize_with = "deserialize_millis")]
    pub poll_interval: Duration,
    /// Bytes requested per transport read.
    pub read_buffer_size: usize,
    /// Largest incomplete record tolerated before the stream is failed.
    pub max_frame_size: usize,
    /// How completed records are grouped into queued frames.
    pub frame_mode: FrameMode,
    /// Forward per-record decode failures to the consumer's error path.
    /// They are logged either way.
    pub report_decode_errors: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            frame_mode: FrameMode::Record,
            report_decode_errors: true,
        }
    }
}

fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.capacity, 24);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.frame_mode, FrameMode::Record);
        assert!(config.report_decode_errors);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: BusConfig =
            serde_json::from_str(r#"{"frame_mode": "batch", "report_decode_errors": false}"#)
                .unwrap();

        assert_eq!(config.frame_mode, FrameMode::Batch);
        assert!(!config.report_decode_errors);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_deserialize_poll_interval_millis() {
        let config: BusConfig = serde_json::from_str(r#"{"poll_interval_ms": 250}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_deserialize_rejects_bad_mode() {
        let result = serde_json::from_str::<BusConfig>(r#"{"frame_mode": "lines"}"#);
        assert!(result.is_err());
    }
}
