//! # rtcall client core
//!
//! Call-session registry and signaling event router for real-time
//! audio/video calls.
//!
//! The crate sits between a signaling transport and per-call session state
//! machines. The transport hands every decoded message to the
//! [`CallClient`]; the client decides whether the message starts a new call or
//! belongs to a registered session, notifies the application with a sanitized
//! copy of the payload, and forwards the raw payload to the session.
//!
//! ```text
//! ┌───────────────┐  on_call / on_accept / ...  ┌────────────────────────────┐
//! │   transport   │ ──────────────────────────▶ │ CallClient                 │
//! └───────────────┘                             │  ├─ EventRouter            │
//!         ▲                                     │  ├─ SessionRegistry        │
//!         │ OutboundSignal                      │  └─ ExtensionSanitizer     │
//! ┌───────┴───────┐   process_on_*(raw payload) └─────────────┬──────────────┘
//! │ CallSession   │ ◀───────────────────────────────────────────┘
//! └───────────────┘   callbacks(sanitized payload) ─▶ application
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use rtcall_client_core::{
//!     CallClient, ChannelSignalingSender, ClientContext, SessionId, SignalingSessionFactory, UserId,
//! };
//! use serde_json::json;
//!
//! let context = ClientContext::new();
//! let (sender, _outbound) = ChannelSignalingSender::new();
//! let client = CallClient::builder()
//!     .user_id("u2")
//!     .session_factory(SignalingSessionFactory::new())
//!     .signaling(sender)
//!     .on_call(|session, extension| {
//!         assert!(extension.get("sdp").is_none());
//!         println!("{} is calling", session.caller_id());
//!         Ok(())
//!     })
//!     .build_in(&context)
//!     .unwrap();
//!
//! let offer = json!({"callerID": "u1", "opponentsIDs": ["u2"], "callType": "VIDEO", "sdp": "v=0"});
//! let session_id = SessionId::from("call-1");
//! client.on_call(&UserId::from("u1"), &session_id, offer.as_object().unwrap());
//!
//! assert_eq!(client.session_count(), 1);
//! client.clear_session(&session_id);
//! assert_eq!(client.session_count(), 0);
//! ```
//!
//! Sessions are never evicted automatically. Whoever owns a call must call
//! [`CallClient::clear_session`] once it reached a terminal state.

pub mod call;
pub mod client;
pub mod error;
pub mod events;
pub mod extension;
pub mod session;
pub mod signaling;

pub use call::{CallType, SessionConnectionState, SessionId, SessionState, UserId};
pub use client::{CallClient, CallClientBuilder, ClientConfig, ClientContext, EventRouter, SessionRegistry};
pub use error::{ClientError, ClientResult};
pub use events::{CallCallback, CallHandlers};
pub use extension::{Extension, ExtensionSanitizer};
pub use session::{
    CallSession, SessionFactory, SessionHooks, SessionParams, SessionRef, SignalingSession,
    SignalingSessionFactory,
};
pub use signaling::{
    spawn_signaling_pump, ChannelSignalingSender, OutboundSignal, SignalKind, SignalingEvent,
    SignalingSender,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
