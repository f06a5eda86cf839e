//! Identifiers and enumerations shared by sessions, the registry and the router

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a call session
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh, globally unique session id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of a signaling participant
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Extract the user id from a chat JID of the form `<id>-<appId>@host/resource`
    ///
    /// Returns `None` when no id precedes the application suffix.
    ///
    /// ```rust
    /// use rtcall_client_core::UserId;
    ///
    /// let id = UserId::from_jid("1234-5678@chat.example.com/web").unwrap();
    /// assert_eq!(id.as_str(), "1234");
    /// assert!(UserId::from_jid("@chat.example.com").is_none());
    /// ```
    pub fn from_jid(jid: &str) -> Option<Self> {
        let node = jid.split('@').next().unwrap_or_default();
        let id = node.split('-').next().unwrap_or_default().trim();
        if id.is_empty() {
            None
        } else {
            Some(Self(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Media kind negotiated for a call
///
/// On the wire the type travels either as its upper-case name or as the
/// numeric code used by older clients (1 = video, 2 = audio).
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallType {
    Video,
    Audio,
}

impl CallType {
    /// Numeric wire code for this call type
    pub fn code(self) -> u8 {
        match self {
            CallType::Video => 1,
            CallType::Audio => 2,
        }
    }

    /// Parse a numeric wire code
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(CallType::Video),
            2 => Some(CallType::Audio),
            _ => None,
        }
    }

    /// Parse a type name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "VIDEO" => Some(CallType::Video),
            "AUDIO" => Some(CallType::Audio),
            other => other.parse::<u64>().ok().and_then(Self::from_code),
        }
    }
}

impl Default for CallType {
    fn default() -> Self {
        CallType::Video
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::Video => write!(f, "VIDEO"),
            CallType::Audio => write!(f, "AUDIO"),
        }
    }
}

/// Lifecycle state of a session, owned by the session itself
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    /// Created, no answer yet
    New,
    /// At least one opponent accepted
    Active,
    /// Every opponent rejected the call
    Rejected,
    /// The call was stopped by either side
    HungUp,
    /// Local resources were released
    Closed,
}

impl SessionState {
    /// Whether no further signaling is expected for this session
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Rejected | SessionState::HungUp | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::New => "NEW",
            SessionState::Active => "ACTIVE",
            SessionState::Rejected => "REJECTED",
            SessionState::HungUp => "HUNGUP",
            SessionState::Closed => "CLOSED",
        };
        write!(f, "{}", name)
    }
}

/// Peer connection state reported by a session for one opponent
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionConnectionState {
    Undefined,
    Connecting,
    Connected,
    Failed,
    Disconnected,
    Closed,
    Completed,
}
