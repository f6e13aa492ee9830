//! Error types for ipnbus-client.
//!
//! [`BusError`] is returned from fallible operations (opening a watch,
//! starting a dispatcher). [`StreamError`] is what a running subscription
//! hands to its consumer's error path.

use std::sync::Arc;

use thiserror::Error;

/// Main error type for all bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error talking to a TCP LocalAPI endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Protocol error (oversized record, malformed response head, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The LocalAPI answered with a non-success status.
    #[error("LocalAPI returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Connecting to the LocalAPI endpoint took longer than allowed.
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// The remote side closed the stream.
    #[error("Connection closed")]
    ConnectionClosed,

    /// `start` was called on a dispatcher that is not idle.
    #[error("Dispatcher already started")]
    AlreadyStarted,
}

/// Result type alias using BusError.
pub type Result<T> = std::result::Result<T, BusError>;

/// Condition reported to a consumer's error path.
///
/// Cheap to clone so a fan-out consumer can hand the same condition to
/// several downstream consumers.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The byte stream ended or failed. Terminal for the subscription.
    #[error("transport failure: {0}")]
    Transport(Arc<BusError>),

    /// One record in a frame could not be decoded. Informational.
    #[error("failed to decode event: {0}")]
    Decode(Arc<serde_json::Error>),

    /// Frames were dropped while the queue was full. Local state may be
    /// stale; re-watch with `INITIAL_STATE` to resync.
    #[error("event queue congested, events were dropped")]
    QueueCongested,
}

impl StreamError {
    /// Whether this condition ends the subscription.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamError::Transport(_))
    }

    /// Whether the consumer should request a fresh snapshot.
    pub fn needs_resync(&self) -> bool {
        matches!(self, StreamError::QueueCongested)
    }
}
