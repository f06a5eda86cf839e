//! Signaling payloads and their application-safe projection
//!
//! Every signaling event carries an [`Extension`]: an open JSON object with a
//! handful of well-known protocol keys and any number of application keys.
//! Sessions always receive the payload untouched. Application callbacks receive
//! the projection built by [`ExtensionSanitizer`], which leaves out the protocol
//! keys so that call identity is read from the session instead.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::call::{CallType, UserId};

/// Payload of a signaling event
pub type Extension = Map<String, Value>;

/// Originating platform of the remote client
pub const KEY_PLATFORM: &str = "platform";
/// Opaque session description
pub const KEY_SDP: &str = "sdp";
/// Ordered list of callee ids
pub const KEY_OPPONENTS_IDS: &str = "opponentsIDs";
/// Id of the user that initiated the call
pub const KEY_CALLER_ID: &str = "callerID";
/// Call media kind
pub const KEY_CALL_TYPE: &str = "callType";
/// Sequence of opaque ICE candidate records
pub const KEY_ICE_CANDIDATES: &str = "iceCandidates";

/// Keys that never reach application callbacks
pub const PROTOCOL_KEYS: [&str; 5] = [
    KEY_PLATFORM,
    KEY_SDP,
    KEY_OPPONENTS_IDS,
    KEY_CALLER_ID,
    KEY_CALL_TYPE,
];

fn user_id_from_value(value: &Value) -> Option<UserId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(UserId(s.clone())),
        Value::Number(n) => Some(UserId(n.to_string())),
        _ => None,
    }
}

/// Caller id carried by a "call" event, as a string or a number
pub fn caller_id(extension: &Extension) -> Option<UserId> {
    extension.get(KEY_CALLER_ID).and_then(user_id_from_value)
}

/// Opponent ids carried by a "call" event; entries that are not ids are skipped
pub fn opponent_ids(extension: &Extension) -> Vec<UserId> {
    extension
        .get(KEY_OPPONENTS_IDS)
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(user_id_from_value).collect())
        .unwrap_or_default()
}

/// Call type carried by a "call" event, by name or numeric code
pub fn call_type(extension: &Extension) -> Option<CallType> {
    match extension.get(KEY_CALL_TYPE)? {
        Value::String(name) => CallType::from_name(name),
        Value::Number(code) => code.as_u64().and_then(CallType::from_code),
        _ => None,
    }
}

/// Session description carried by the event, if any
pub fn sdp(extension: &Extension) -> Option<&str> {
    extension.get(KEY_SDP).and_then(Value::as_str)
}

/// Number of ICE candidates carried by the event
pub fn ice_candidate_count(extension: &Extension) -> usize {
    extension
        .get(KEY_ICE_CANDIDATES)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Deny-list projection of signaling payloads
///
/// The projection is a new map assembled from the entries that survive the deny
/// list; the input is only borrowed. The default deny list is
/// [`PROTOCOL_KEYS`], and more keys can be added for deployments that carry
/// extra protocol data.
///
/// ```rust
/// use rtcall_client_core::ExtensionSanitizer;
/// use serde_json::json;
///
/// let raw = json!({"sdp": "v=0", "callerID": 1, "note": "hi"});
/// let raw = raw.as_object().unwrap();
///
/// let safe = ExtensionSanitizer::default().project(raw);
/// assert!(safe.get("sdp").is_none());
/// assert_eq!(safe["note"], "hi");
/// assert_eq!(raw.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct ExtensionSanitizer {
    denied: BTreeSet<String>,
}

impl Default for ExtensionSanitizer {
    fn default() -> Self {
        Self {
            denied: PROTOCOL_KEYS.iter().map(|key| key.to_string()).collect(),
        }
    }
}

impl ExtensionSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also deny `key`, on top of the protocol keys
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.denied.insert(key.into());
        self
    }

    /// Whether `key` is removed by this sanitizer
    pub fn is_denied(&self, key: &str) -> bool {
        self.denied.contains(key)
    }

    /// Build the application-safe copy of `extension`
    pub fn project(&self, extension: &Extension) -> Extension {
        extension
            .iter()
            .filter(|(key, _)| !self.denied.contains(key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}
