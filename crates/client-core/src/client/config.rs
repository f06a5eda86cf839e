//! Client configuration
//!
//! ```rust
//! use rtcall_client_core::client::config::ClientConfig;
//!
//! let config = ClientConfig::new()
//!     .with_jid("1234-99@chat.example.com/web")
//!     .with_trace_payloads(true)
//!     .with_sanitized_key("authToken");
//!
//! assert_eq!(config.resolve_user_id().unwrap().as_str(), "1234");
//! assert!(config.sanitizer().is_denied("authToken"));
//! ```

use serde::{Deserialize, Serialize};

use crate::call::UserId;
use crate::error::{ClientError, ClientResult};
use crate::extension::ExtensionSanitizer;

/// Settings for a [`CallClient`](crate::CallClient)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local user id; takes precedence over `jid`
    pub user_id: Option<UserId>,
    /// Chat JID of the local user, used when `user_id` is not set
    pub jid: Option<String>,
    /// Log full signaling payloads at debug level
    pub trace_payloads: bool,
    /// Keys removed from application payloads in addition to the protocol keys
    pub extra_sanitized_keys: Vec<String>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_id(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_jid(mut self, jid: impl Into<String>) -> Self {
        self.jid = Some(jid.into());
        self
    }

    pub fn with_trace_payloads(mut self, enabled: bool) -> Self {
        self.trace_payloads = enabled;
        self
    }

    pub fn with_sanitized_key(mut self, key: impl Into<String>) -> Self {
        self.extra_sanitized_keys.push(key.into());
        self
    }

    /// The local user id, from `user_id` or parsed out of `jid`
    pub fn resolve_user_id(&self) -> ClientResult<UserId> {
        if let Some(user_id) = self.user_id.as_ref().filter(|id| !id.0.is_empty()) {
            return Ok(user_id.clone());
        }
        match self.jid.as_deref() {
            Some(jid) => UserId::from_jid(jid)
                .ok_or_else(|| ClientError::configuration(format!("no user id in JID '{}'", jid))),
            None => Err(ClientError::configuration("either user_id or jid must be set")),
        }
    }

    /// Sanitizer for application payloads under this configuration
    pub fn sanitizer(&self) -> ExtensionSanitizer {
        self.extra_sanitized_keys
            .iter()
            .fold(ExtensionSanitizer::default(), |sanitizer, key| sanitizer.with_key(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_id_takes_precedence_over_jid() {
        let config = ClientConfig::new()
            .with_jid("5-1@chat.example.com")
            .with_user_id("7");
        assert_eq!(config.resolve_user_id().unwrap(), UserId::from("7"));
    }

    #[test]
    fn test_missing_identity_is_a_configuration_error() {
        let err = ClientConfig::new().resolve_user_id().unwrap_err();
        assert!(matches!(err, ClientError::Configuration { .. }));

        let err = ClientConfig::new().with_jid("@chat.example.com").resolve_user_id().unwrap_err();
        assert!(err.to_string().contains("@chat.example.com"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ClientConfig = serde_json::from_value(json!({
            "user_id": "u1",
            "extra_sanitized_keys": ["token"]
        }))
        .unwrap();

        assert_eq!(config.user_id, Some(UserId::from("u1")));
        assert!(!config.trace_payloads);
        assert!(config.sanitizer().is_denied("token"));
        assert!(config.sanitizer().is_denied("platform"));
    }
}
