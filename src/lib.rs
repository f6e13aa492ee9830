//! # ipnbus-client
//!
//! Client for the Tailscale IPN notification bus.
//!
//! The LocalAPI `watch-ipn-bus` endpoint answers with a long-lived stream of
//! newline-delimited JSON notifications. This crate turns that byte stream
//! into typed events for a consumer, without ever letting a slow consumer
//! stall the transport.
//!
//! ## Architecture
//!
//! - **Framing** ([`protocol`]): cuts the byte stream into newline-terminated
//!   frames, whatever the chunk boundaries
//! - **Queue** ([`backpressure`]): bounded FIFO between reader and consumer;
//!   drops new frames when full and raises a single congestion signal
//! - **Dispatcher** ([`StreamDispatcher`]): reader task plus drain loop,
//!   decoding each record and calling the [`Consumer`]
//! - **Transport** ([`transport`]): opens the watch request on a LocalAPI
//!   endpoint (TCP loopback or Unix socket)
//!
//! ## Example
//!
//! ```ignore
//! use ipnbus_client::consumer::channel;
//! use ipnbus_client::ipn::{Notify, WatchOpts};
//! use ipnbus_client::transport::{LocalApiTransport, WatchRequest};
//! use ipnbus_client::{watch_ipn_bus, BusConfig, BusMessage};
//!
//! #[tokio::main]
//! async fn main() -> ipnbus_client::Result<()> {
//!     let transport = LocalApiTransport::tcp("127.0.0.1:41112".parse().unwrap());
//!     let request = WatchRequest::new(WatchOpts::INITIAL_STATE | WatchOpts::NETMAP)
//!         .with_api_key("loopback-key");
//!
//!     let (consumer, mut rx) = channel::<Notify>(16);
//!     let _dispatcher = watch_ipn_bus(&transport, &request, consumer, BusConfig::default()).await?;
//!
//!     while let Some(message) = rx.recv().await {
//!         match message {
//!             BusMessage::Event(notify) => println!("{:?}", notify.state),
//!             BusMessage::Error(e) => eprintln!("bus error: {}", e),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod backpressure;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
pub mod ipn;
pub mod protocol;
pub mod transport;

mod dispatcher;

pub use config::BusConfig;
pub use consumer::{BusMessage, Consumer};
pub use dispatcher::{watch_ipn_bus, DispatcherBuilder, DispatcherState, StreamDispatcher};
pub use error::{BusError, Result, StreamError};
pub use ipn::{Notify, WatchOpts};
