//! The `watch-ipn-bus` request.
//!
//! LocalAPI served through a tsnet loopback listener requires basic auth
//! with the user `tsnet` and the loopback API key as password, plus the
//! `Sec-Tailscale: localapi` header. A Unix socket LocalAPI needs neither
//! credential; the header is harmless there.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::ipn::WatchOpts;

/// Path prefix of every LocalAPI endpoint.
pub const LOCAL_API_PATH: &str = "/localapi/v0/";

/// Endpoint name of the notification bus.
pub const WATCH_ENDPOINT: &str = "watch-ipn-bus";

/// A request to watch the IPN bus.
#[derive(Clone, PartialEq, Eq)]
pub struct WatchRequest {
    opts: WatchOpts,
    api_key: Option<String>,
}

impl WatchRequest {
    /// Watch with the given options and no credential.
    pub fn new(opts: WatchOpts) -> Self {
        Self {
            opts,
            api_key: None,
        }
    }

    /// Authenticate with a loopback LocalAPI key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// The watch options.
    pub fn opts(&self) -> WatchOpts {
        self.opts
    }

    /// The same request with different options, e.g. for a resync.
    pub fn with_opts(&self, opts: WatchOpts) -> Self {
        Self {
            opts,
            api_key: self.api_key.clone(),
        }
    }

    /// The loopback API key, if any.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Request target: path and query.
    pub fn path_and_query(&self) -> String {
        format!(
            "{}{}?mask={}",
            LOCAL_API_PATH,
            WATCH_ENDPOINT,
            self.opts.bits()
        )
    }

    /// Value of the `Authorization` header, if a key is set.
    pub fn authorization(&self) -> Option<String> {
        self.api_key
            .as_ref()
            .map(|key| format!("Basic {}", STANDARD.encode(format!("tsnet:{}", key))))
    }

    /// Render the request head for a raw stream (see
    /// [`open_on`](super::open_on)).
    ///
    /// HTTP/1.0 keeps the response body close-delimited, so it can be read
    /// as a plain byte stream without chunked decoding.
    pub fn to_http(&self, host: &str) -> String {
        let mut head = format!(
            "GET {} HTTP/1.0\r\nHost: {}\r\nSec-Tailscale: localapi\r\nAccept: application/json\r\n",
            self.path_and_query(),
            host
        );
        if let Some(auth) = self.authorization() {
            head.push_str("Authorization: ");
            head.push_str(&auth);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head
    }
}

impl std::fmt::Debug for WatchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRequest")
            .field("opts", &self.opts)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
