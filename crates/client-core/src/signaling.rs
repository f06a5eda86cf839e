//! Signaling messages exchanged with the transport
//!
//! Inbound, the transport decodes messages into [`SignalingEvent`]s and hands
//! them to the client, either directly through the `on_*` entry points or
//! through a channel drained by [`spawn_signaling_pump`]. Outbound, sessions
//! send [`OutboundSignal`]s through a [`SignalingSender`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::call::{SessionId, UserId};
use crate::client::CallClient;
use crate::error::{ClientError, ClientResult};
use crate::extension::Extension;

/// Kind of a signaling message
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    Call,
    Accept,
    Reject,
    Stop,
    IceCandidates,
    Update,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Call => "call",
            SignalKind::Accept => "accept",
            SignalKind::Reject => "reject",
            SignalKind::Stop => "stop",
            SignalKind::IceCandidates => "iceCandidates",
            SignalKind::Update => "update",
        };
        write!(f, "{}", name)
    }
}

/// A decoded inbound signaling message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingEvent {
    pub kind: SignalKind,
    /// Sender of the message
    pub user_id: UserId,
    pub session_id: SessionId,
    #[serde(default)]
    pub extension: Extension,
}

impl SignalingEvent {
    pub fn new(kind: SignalKind, user_id: UserId, session_id: SessionId, extension: Extension) -> Self {
        Self {
            kind,
            user_id,
            session_id,
            extension,
        }
    }
}

/// A signaling message a session wants delivered to one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundSignal {
    pub kind: SignalKind,
    /// Recipient of the message
    pub to: UserId,
    pub session_id: SessionId,
    pub extension: Extension,
}

/// Outbound side of the signaling transport
#[async_trait]
pub trait SignalingSender: Send + Sync {
    async fn send(&self, signal: OutboundSignal) -> ClientResult<()>;
}

/// Sender that queues outbound signals on an unbounded channel
///
/// The receiving half is typically owned by the transport task that encodes and
/// writes the messages.
#[derive(Debug, Clone)]
pub struct ChannelSignalingSender {
    tx: mpsc::UnboundedSender<OutboundSignal>,
}

impl ChannelSignalingSender {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SignalingSender for ChannelSignalingSender {
    async fn send(&self, signal: OutboundSignal) -> ClientResult<()> {
        self.tx
            .send(signal)
            .map_err(|e| ClientError::signaling(format!("transport channel closed: {}", e)))
    }
}

/// Dispatch inbound events from `rx` to `client` in arrival order
///
/// The task ends when every sender of the channel has been dropped.
pub fn spawn_signaling_pump(
    client: Arc<CallClient>,
    mut rx: mpsc::Receiver<SignalingEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Signaling pump started for user {}", client.current_user());
        while let Some(event) = rx.recv().await {
            debug!(kind = %event.kind, session_id = %event.session_id, "Pumping signaling event");
            client.dispatch(&event);
        }
        info!("Signaling pump stopped, inbound channel closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_sender_delivers() {
        let (sender, mut rx) = ChannelSignalingSender::new();
        let signal = OutboundSignal {
            kind: SignalKind::Accept,
            to: UserId::from("u1"),
            session_id: SessionId::from("s-1"),
            extension: Extension::new(),
        };

        sender.send(signal.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(signal));
    }

    #[tokio::test]
    async fn test_channel_sender_reports_closed_transport() {
        let (sender, rx) = ChannelSignalingSender::new();
        drop(rx);

        let result = sender
            .send(OutboundSignal {
                kind: SignalKind::Stop,
                to: UserId::from("u2"),
                session_id: SessionId::from("s-2"),
                extension: Extension::new(),
            })
            .await;
        assert!(matches!(result, Err(ClientError::Signaling { .. })));
    }

    #[test]
    fn test_event_deserialization() {
        let event: SignalingEvent = serde_json::from_value(json!({
            "kind": "iceCandidates",
            "user_id": "u3",
            "session_id": "abc",
            "extension": {"iceCandidates": []}
        }))
        .unwrap();

        assert_eq!(event.kind, SignalKind::IceCandidates);
        assert_eq!(event.user_id, UserId::from("u3"));
        assert_eq!(event.session_id, SessionId::from("abc"));
        assert!(event.extension.contains_key("iceCandidates"));
    }
}
