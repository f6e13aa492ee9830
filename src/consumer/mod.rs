//! Consumer module - where decoded events end up.
//!
//! A dispatcher delivers to exactly one [`Consumer`]: a pair of async
//! callbacks, `on_event` and `on_error`. Calls are made one at a time; the
//! next call is not made until the previous future completes.
//!
//! Provides:
//! - [`Consumer`] - the capability pair
//! - [`FnConsumer`] / [`consumer_fn`] - build a consumer from two closures
//! - [`ChannelConsumer`] / [`channel`] - forward everything into an mpsc channel
//! - [`Fanout`] - forward to several consumers in turn
//!
//! # Example
//!
//! ```ignore
//! use ipnbus_client::consumer::consumer_fn;
//! use ipnbus_client::ipn::Notify;
//!
//! let consumer = consumer_fn(
//!     |notify: Notify| async move {
//!         println!("state: {:?}", notify.state);
//!     },
//!     |error| async move {
//!         eprintln!("bus error: {}", error);
//!     },
//! );
//! ```

mod callback;
mod channel;
mod fanout;

pub use callback::{consumer_fn, BoxFuture, Consumer, FnConsumer};
pub use channel::{channel, BusMessage, ChannelConsumer};
pub use fanout::Fanout;
