//! Transport module - opening the long-lived watch request.
//!
//! The dispatcher only needs a byte stream. This module provides:
//! - [`Transport`] - "open a watch request, get back a byte stream"
//! - [`WatchRequest`] - the `watch-ipn-bus` request and its auth headers
//! - [`LocalApiTransport`] - TCP loopback or Unix socket LocalAPI client
//!
//! Closing the stream (dropping it) cancels the request.

mod local_api;
mod request;

use std::pin::Pin;

use tokio::io::AsyncRead;

use crate::consumer::BoxFuture;
use crate::error::Result;

pub use local_api::{open_on, Endpoint, LocalApiTransport, DEFAULT_CONNECT_TIMEOUT};
pub use request::{WatchRequest, LOCAL_API_PATH, WATCH_ENDPOINT};

/// Body of an open watch request.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Something that can open a watch request.
pub trait Transport: Send + Sync {
    /// Open the request and return its body once the response head has been
    /// accepted.
    fn open<'a>(&'a self, request: &'a WatchRequest) -> BoxFuture<'a, Result<ByteStream>>;
}
