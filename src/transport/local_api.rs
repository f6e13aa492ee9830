//! LocalAPI transport over TCP loopback or a Unix socket.
//!
//! - TCP: the loopback listener of an embedded node (needs an API key).
//!   Requests go through `reqwest`; the streamed body is adapted into an
//!   `AsyncRead` with `tokio_util::io::StreamReader`.
//! - Unix: the `tailscaled` socket (unix only). `reqwest` has no Unix socket
//!   connector, so [`open_on`] writes an HTTP/1.0 request itself and reads
//!   the close-delimited body directly.
//!
//! # Example
//!
//! ```ignore
//! use ipnbus_client::ipn::WatchOpts;
//! use ipnbus_client::transport::{LocalApiTransport, Transport, WatchRequest};
//!
//! let transport = LocalApiTransport::tcp("127.0.0.1:41112".parse()?);
//! let request = WatchRequest::new(WatchOpts::INITIAL_STATE).with_api_key(key);
//! let stream = transport.open(&request).await?;
//! ```

use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio_util::io::StreamReader;

use super::{ByteStream, Transport, WatchRequest};
use crate::consumer::BoxFuture;
use crate::error::{BusError, Result};

/// Default time allowed for connecting and receiving the response head.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Host header used when talking to a Unix socket.
#[cfg(unix)]
const UNIX_SOCKET_HOST: &str = "local-tailscaled.sock";

/// Upper bound on the size of a response head.
const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Upper bound on the error body read from a failed response.
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Where the LocalAPI listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// TCP address, usually loopback.
    Tcp(SocketAddr),
    /// Unix domain socket path.
    #[cfg(unix)]
    Unix(PathBuf),
}

/// Opens watch requests against a LocalAPI endpoint.
#[derive(Debug, Clone)]
pub struct LocalApiTransport {
    endpoint: Endpoint,
    connect_timeout: Duration,
}

impl LocalApiTransport {
    /// Transport for a TCP endpoint.
    pub fn tcp(addr: SocketAddr) -> Self {
        Self::new(Endpoint::Tcp(addr))
    }

    /// Transport for a Unix socket endpoint.
    #[cfg(unix)]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(Endpoint::Unix(path.into()))
    }

    /// Transport for any endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the time allowed for connecting and receiving the response head.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect_and_send(&self, request: &WatchRequest) -> Result<ByteStream> {
        match &self.endpoint {
            Endpoint::Tcp(addr) => {
                tracing::debug!("Opening {} via {}", request.path_and_query(), addr);
                self.open_http(*addr, request).await
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                tracing::debug!(
                    "Opening {} via {}",
                    request.path_and_query(),
                    path.display()
                );
                let stream = tokio::net::UnixStream::connect(path).await?;
                open_on(stream, request, UNIX_SOCKET_HOST).await
            }
        }
    }

    async fn open_http(&self, addr: SocketAddr, request: &WatchRequest) -> Result<ByteStream> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(true)
            .no_proxy()
            .build()?;

        let url = format!("http://{}{}", addr, request.path_and_query());
        let mut builder = client
            .get(url)
            .header("Sec-Tailscale", "localapi")
            .header(ACCEPT, "application/json");
        if let Some(key) = request.api_key() {
            builder = builder.basic_auth("tsnet", Some(key));
        }

        let mut response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await? {
                body.extend_from_slice(&chunk);
                if body.len() >= MAX_ERROR_BODY {
                    body.truncate(MAX_ERROR_BODY);
                    break;
                }
            }
            return Err(BusError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(body)))
    }
}

impl Transport for LocalApiTransport {
    fn open<'a>(&'a self, request: &'a WatchRequest) -> BoxFuture<'a, Result<ByteStream>> {
        Box::pin(async move {
            let timeout = self.connect_timeout;
            tokio::time::timeout(timeout, self.connect_and_send(request))
                .await
                .map_err(|_| BusError::ConnectTimeout(timeout))?
        })
    }
}

/// Send a watch request over an already-connected stream.
///
/// Used for Unix sockets and other raw streams. Returns the response body
/// once a 2xx head has been read. Bytes of the body that arrived together
/// with the head are preserved.
///
/// # Errors
///
/// - `BusError::Status` for a non-2xx response, with the server's message
/// - `BusError::Protocol` for a malformed or oversized head
/// - `BusError::Io` for connection failures
pub async fn open_on<S>(mut stream: S, request: &WatchRequest, host: &str) -> Result<ByteStream>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    stream.write_all(request.to_http(host).as_bytes()).await?;
    stream.flush().await?;

    let mut reader = BufReader::new(stream);
    let status = read_response_head(&mut reader).await?;

    if !(200..300).contains(&status) {
        let mut body = Vec::new();
        (&mut reader)
            .take(MAX_ERROR_BODY as u64)
            .read_to_end(&mut body)
            .await?;
        return Err(BusError::Status {
            status,
            message: error_message(&body),
        });
    }

    Ok(Box::pin(reader))
}

/// Read the status line and headers, returning the status code.
///
/// Never buffers more than `MAX_HEAD_SIZE` bytes, even for a line that has
/// no terminator.
async fn read_response_head<R>(reader: &mut R) -> Result<u16>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut remaining = MAX_HEAD_SIZE;
    let mut status = None;

    loop {
        line.clear();
        let n = (&mut *reader)
            .take(remaining as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if line.last() != Some(&b'\n') {
            if n == remaining {
                return Err(BusError::Protocol(format!(
                    "Response head exceeds {} bytes",
                    MAX_HEAD_SIZE
                )));
            }
            return Err(BusError::Protocol(
                "Connection closed before response head".to_string(),
            ));
        }
        remaining -= n;

        let text = String::from_utf8_lossy(&line);
        let trimmed = text.trim_end_matches(['\r', '\n']);
        match status {
            None => status = Some(parse_status_line(trimmed)?),
            Some(_) if trimmed.is_empty() => break,
            Some(_) => {
                if let Some((name, value)) = trimmed.split_once(':') {
                    if name.trim().eq_ignore_ascii_case("transfer-encoding")
                        && value.trim().eq_ignore_ascii_case("chunked")
                    {
                        return Err(BusError::Protocol(
                            "Chunked response body is not supported".to_string(),
                        ));
                    }
                }
            }
        }
    }

    status.ok_or_else(|| BusError::Protocol("Missing status line".to_string()))
}

fn parse_status_line(line: &str) -> Result<u16> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse()
            .map_err(|_| BusError::Protocol(format!("Invalid status line: {}", line))),
        _ => Err(BusError::Protocol(format!("Invalid status line: {}", line))),
    }
}

/// LocalAPI errors are JSON objects with a single `Error` field.
#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "Error")]
    error: String,
}

fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ApiError>(body) {
        Ok(err) => err.error,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}
