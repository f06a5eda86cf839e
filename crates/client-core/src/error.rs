//! Error types for the call client
//!
//! Only conditions the caller has to act on are surfaced as errors. Events for
//! unknown sessions and duplicate "call" events are expected during normal
//! signaling and are handled (logged or suppressed) inside the router instead.

use thiserror::Error;

/// Result type for call client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the call client
#[derive(Debug, Error)]
pub enum ClientError {
    /// An argument supplied by the caller is not acceptable
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The client could not be assembled from the supplied configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The outbound signaling sender failed to deliver a message
    #[error("Signaling error: {message}")]
    Signaling { message: String },

    /// A session-level operation was requested in a state that does not allow it
    #[error("Invalid session state: {message}")]
    InvalidState { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a signaling error
    pub fn signaling(message: impl Into<String>) -> Self {
        Self::Signaling {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
