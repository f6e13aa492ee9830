//! IPN bus types: watch options and the notification record.
//!
//! The bus schema is owned by the node and changes between releases, so
//! [`Notify`] only types the small, stable fields and keeps the large
//! structures (prefs, netmap, engine status) as raw JSON. Unknown fields are
//! ignored. Callers that need more can decode into their own type instead;
//! the dispatcher is generic over the event type.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::Value;

bitflags! {
    /// Bitmask selecting which notifications a watch receives.
    ///
    /// Sent as the `mask` query parameter of `watch-ipn-bus`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct WatchOpts: u64 {
        /// Engine status updates (traffic counters, peer counts).
        const ENGINE_UPDATES     = 1 << 0;
        /// Send the current state, prefs and netmap immediately.
        const INITIAL_STATE      = 1 << 1;
        /// Preference changes.
        const PREFS              = 1 << 2;
        /// Network map changes.
        const NETMAP             = 1 << 3;
        /// Strip private keys from prefs and netmap.
        const NO_PRIVATE_KEYS    = 1 << 4;
        /// Coalesce netmap updates to roughly one every few seconds.
        const RATE_LIMIT_NETMAPS = 1 << 8;
    }
}

impl WatchOpts {
    /// Options for re-watching after a congestion notice: the same set with
    /// `INITIAL_STATE` added so the node resends a full snapshot.
    pub const fn for_resync(self) -> Self {
        self.union(Self::INITIAL_STATE)
    }
}

/// Backend state of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum State {
    /// No state yet.
    NoState,
    /// Another OS user owns the node.
    InUseOtherUser,
    /// Interactive login is required.
    NeedsLogin,
    /// An admin must approve the machine.
    NeedsMachineAuth,
    /// Stopped by the user.
    Stopped,
    /// Coming up.
    Starting,
    /// Connected to the tailnet.
    Running,
    /// A value this crate does not know about.
    Other(i64),
}

impl From<i64> for State {
    fn from(value: i64) -> Self {
        match value {
            0 => State::NoState,
            1 => State::InUseOtherUser,
            2 => State::NeedsLogin,
            3 => State::NeedsMachineAuth,
            4 => State::Stopped,
            5 => State::Starting,
            6 => State::Running,
            other => State::Other(other),
        }
    }
}

impl From<State> for i64 {
    fn from(state: State) -> Self {
        match state {
            State::NoState => 0,
            State::InUseOtherUser => 1,
            State::NeedsLogin => 2,
            State::NeedsMachineAuth => 3,
            State::Stopped => 4,
            State::Starting => 5,
            State::Running => 6,
            State::Other(other) => other,
        }
    }
}

/// One notification from the IPN bus.
///
/// Every field is optional; a notification usually carries only the parts
/// that changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notify {
    /// Node version, sent in the first notification of a watch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Identifier of this watch session.
    #[serde(rename = "SessionID", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Error reported by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_message: Option<String>,
    /// Present (as an empty object) when an interactive login completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_finished: Option<Value>,
    /// New backend state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    /// Current preferences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefs: Option<Value>,
    /// Current network map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_map: Option<Value>,
    /// Engine status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<Value>,
    /// URL the user should open to log in.
    #[serde(rename = "BrowseToURL", skip_serializing_if = "Option::is_none")]
    pub browse_to_url: Option<String>,
    /// Local TCP port of the LocalAPI, when applicable.
    #[serde(rename = "LocalTCPPort", skip_serializing_if = "Option::is_none")]
    pub local_tcp_port: Option<u16>,
    /// Client update information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_version: Option<Value>,
}

impl Notify {
    /// Check if this notification reports a completed login.
    pub fn is_login_finished(&self) -> bool {
        self.login_finished.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_opts_bits() {
        assert_eq!(WatchOpts::ENGINE_UPDATES.bits(), 1);
        assert_eq!(WatchOpts::INITIAL_STATE.bits(), 2);
        assert_eq!(WatchOpts::NETMAP.bits(), 8);
        assert_eq!(WatchOpts::RATE_LIMIT_NETMAPS.bits(), 256);

        let opts = WatchOpts::INITIAL_STATE | WatchOpts::PREFS | WatchOpts::NETMAP;
        assert_eq!(opts.bits(), 14);
        assert!(opts.contains(WatchOpts::PREFS));
        assert!(!opts.contains(WatchOpts::ENGINE_UPDATES));
    }

    #[test]
    fn test_watch_opts_resync_adds_initial_state() {
        let opts = WatchOpts::NETMAP | WatchOpts::RATE_LIMIT_NETMAPS;
        let resync = opts.for_resync();

        assert!(resync.contains(WatchOpts::INITIAL_STATE));
        assert!(resync.contains(opts));
        assert_eq!(resync.for_resync(), resync);
    }

    #[test]
    fn test_watch_opts_keeps_unknown_bits() {
        let opts = WatchOpts::PREFS | WatchOpts::from_bits_retain(1 << 20);
        assert_eq!(opts.bits(), (1 << 2) | (1 << 20));

        let text = format!("{:?}", opts);
        assert!(text.contains("PREFS"));
        assert!(text.contains("0x100000"));
    }

    #[test]
    fn test_watch_opts_serde_uses_flag_names() {
        let opts = WatchOpts::PREFS | WatchOpts::NETMAP;
        let json = serde_json::to_string(&opts).unwrap();
        assert_eq!(json, r#""PREFS | NETMAP""#);

        let decoded: WatchOpts = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, opts);
    }

    #[test]
    fn test_decode_notify() {
        let json = br#"{"Version":"1.80.0","SessionID":"abc","State":6,"BrowseToURL":"https://login","NetMap":{"Peers":[]},"Unknown":true}"#;
        let notify: Notify = serde_json::from_slice(json).unwrap();

        assert_eq!(notify.version.as_deref(), Some("1.80.0"));
        assert_eq!(notify.session_id.as_deref(), Some("abc"));
        assert_eq!(notify.state, Some(State::Running));
        assert_eq!(notify.browse_to_url.as_deref(), Some("https://login"));
        assert!(notify.net_map.is_some());
        assert!(notify.prefs.is_none());
    }

    #[test]
    fn test_decode_unknown_state() {
        let notify: Notify = serde_json::from_slice(br#"{"State":42}"#).unwrap();
        assert_eq!(notify.state, Some(State::Other(42)));
    }

    #[test]
    fn test_login_finished() {
        let notify: Notify = serde_json::from_slice(br#"{"LoginFinished":{}}"#).unwrap();
        assert!(notify.is_login_finished());
        assert!(!Notify::default().is_login_finished());
    }

    #[test]
    fn test_serialize_skips_absent_fields() {
        let notify = Notify {
            state: Some(State::NeedsLogin),
            ..Notify::default()
        };
        assert_eq!(serde_json::to_string(&notify).unwrap(), r#"{"State":2}"#);
    }
}
