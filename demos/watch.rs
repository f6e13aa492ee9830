//! Watch - print IPN bus notifications from a LocalAPI endpoint.
//!
//! This example demonstrates:
//! - Opening a watch with `LocalApiTransport`
//! - Receiving events through the channel consumer
//! - Resyncing with `INITIAL_STATE` after the queue was congested
//!
//! # Running
//!
//! ```text
//! # Embedded node, loopback LocalAPI
//! IPNBUS_ADDR=127.0.0.1:41112 IPNBUS_KEY=<loopback key> cargo run --example watch
//!
//! # tailscaled socket
//! IPNBUS_SOCKET=/var/run/tailscale/tailscaled.sock cargo run --example watch
//! ```
//!
//! Set `RUST_LOG=ipnbus_client=debug` to see the dispatcher's own logging.

use ipnbus_client::consumer::channel;
use ipnbus_client::ipn::{Notify, WatchOpts};
use ipnbus_client::transport::{LocalApiTransport, WatchRequest};
use ipnbus_client::{watch_ipn_bus, BusConfig, BusMessage, StreamError};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
fn socket_from_env() -> Option<LocalApiTransport> {
    std::env::var("IPNBUS_SOCKET").ok().map(LocalApiTransport::unix)
}

#[cfg(not(unix))]
fn socket_from_env() -> Option<LocalApiTransport> {
    None
}

fn transport_from_env() -> Result<LocalApiTransport, Box<dyn std::error::Error>> {
    if let Some(transport) = socket_from_env() {
        return Ok(transport);
    }

    let addr = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("IPNBUS_ADDR").ok())
        .unwrap_or_else(|| "127.0.0.1:41112".to_string());
    Ok(LocalApiTransport::tcp(addr.parse()?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let transport = transport_from_env()?;
    let opts = WatchOpts::INITIAL_STATE
        | WatchOpts::PREFS
        | WatchOpts::NETMAP
        | WatchOpts::NO_PRIVATE_KEYS
        | WatchOpts::RATE_LIMIT_NETMAPS;

    let mut request = WatchRequest::new(opts);
    if let Ok(key) = std::env::var("IPNBUS_KEY") {
        request = request.with_api_key(key);
    }

    loop {
        let (consumer, mut rx) = channel::<Notify>(32);
        let dispatcher =
            watch_ipn_bus(&transport, &request, consumer, BusConfig::default()).await?;
        tracing::info!("Watching {:?}", request.opts());

        let mut resync = false;
        while let Some(message) = rx.recv().await {
            match message {
                BusMessage::Event(notify) => print_notify(&notify),
                BusMessage::Error(StreamError::QueueCongested) => {
                    tracing::warn!("Fell behind the bus, resyncing");
                    resync = true;
                    break;
                }
                BusMessage::Error(StreamError::Decode(e)) => {
                    tracing::warn!("Skipping undecodable notification: {}", e);
                }
                BusMessage::Error(StreamError::Transport(e)) => {
                    tracing::error!("Bus stream ended: {}", e);
                    break;
                }
            }
        }

        dispatcher.cancel();
        dispatcher.closed().await;

        if !resync {
            return Ok(());
        }
        request = request.with_opts(request.opts().for_resync());
    }
}

fn print_notify(notify: &Notify) {
    if let Some(state) = &notify.state {
        println!("state: {:?}", state);
    }
    if let Some(version) = &notify.version {
        println!("version: {}", version);
    }
    if let Some(message) = &notify.err_message {
        println!("error: {}", message);
    }
    if let Some(url) = &notify.browse_to_url {
        println!("login at: {}", url);
    }
    if notify.net_map.is_some() {
        println!("netmap updated");
    }
    if notify.prefs.is_some() {
        println!("prefs updated");
    }
}
