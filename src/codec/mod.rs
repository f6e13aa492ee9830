//! Codec module - turning bus records into typed events.
//!
//! Records on the bus are JSON documents. [`JsonCodec`] is the single place
//! where record bytes meet `serde_json`, so the dispatcher never deals with
//! serialization details directly.
//!
//! # Example
//!
//! ```
//! use ipnbus_client::codec::JsonCodec;
//! use ipnbus_client::ipn::{Notify, State};
//!
//! let notify: Notify = JsonCodec::decode(br#"{"State":2}"#).unwrap();
//! assert_eq!(notify.state, Some(State::NeedsLogin));
//! ```

mod json;

pub use json::JsonCodec;
