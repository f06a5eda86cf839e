//! Contract between the router and per-call session state machines
//!
//! The router never negotiates media itself. It owns the registry of sessions
//! and hands every signaling event to the owning [`CallSession`], which runs the
//! offer/answer and ICE protocol and owns the session state. Sessions are built
//! by a [`SessionFactory`] from [`SessionParams`]; the params carry the
//! per-session [`SessionHooks`] that were registered on the client when the
//! session was created.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::call::{CallType, SessionConnectionState, SessionId, SessionState, UserId};
use crate::extension::Extension;
use crate::signaling::SignalingSender;

pub mod signaling_session;

pub use signaling_session::{SignalingSession, SignalingSessionFactory};

/// Shared handle to a registered session
pub type SessionRef = Arc<dyn CallSession>;

/// Per-call state machine driven by inbound signaling
///
/// Identity accessors must return the values supplied at construction for the
/// whole lifetime of the session. `process_on_*` receive the unsanitized payload
/// of the event.
pub trait CallSession: Send + Sync + fmt::Debug {
    fn id(&self) -> &SessionId;

    fn caller_id(&self) -> &UserId;

    fn opponent_ids(&self) -> &[UserId];

    fn call_type(&self) -> CallType;

    fn state(&self) -> SessionState;

    /// Access to the concrete session type, e.g. for local call actions
    fn as_any(&self) -> &dyn Any;

    fn process_on_call(&self, user_id: &UserId, extension: &Extension);

    fn process_on_accept(&self, user_id: &UserId, extension: &Extension);

    fn process_on_reject(&self, user_id: &UserId, extension: &Extension);

    fn process_on_stop(&self, user_id: &UserId, extension: &Extension);

    fn process_on_ice_candidates(&self, user_id: &UserId, extension: &Extension);

    fn process_on_update(&self, user_id: &UserId, extension: &Extension);
}

/// Opponent did not answer within the session's answer window
pub type UserNotAnswerHook = Arc<dyn Fn(&dyn CallSession, &UserId) -> anyhow::Result<()> + Send + Sync>;

/// A remote media stream identified by `stream_id` became available
pub type RemoteStreamHook =
    Arc<dyn Fn(&dyn CallSession, &UserId, &str) -> anyhow::Result<()> + Send + Sync>;

/// The peer connection towards one opponent changed state
pub type ConnectionStateHook = Arc<
    dyn Fn(&dyn CallSession, &UserId, SessionConnectionState) -> anyhow::Result<()> + Send + Sync,
>;

/// The session finished and released its resources
pub type SessionCloseHook = Arc<dyn Fn(&dyn CallSession) -> anyhow::Result<()> + Send + Sync>;

/// Hooks captured by value onto each session at creation time
///
/// Rebinding the hooks on the client affects sessions created afterwards only.
#[derive(Clone, Default)]
pub struct SessionHooks {
    pub on_user_not_answer: Option<UserNotAnswerHook>,
    pub on_remote_stream: Option<RemoteStreamHook>,
    pub on_session_connection_state_changed: Option<ConnectionStateHook>,
    pub on_session_close: Option<SessionCloseHook>,
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHooks")
            .field("on_user_not_answer", &self.on_user_not_answer.is_some())
            .field("on_remote_stream", &self.on_remote_stream.is_some())
            .field(
                "on_session_connection_state_changed",
                &self.on_session_connection_state_changed.is_some(),
            )
            .field("on_session_close", &self.on_session_close.is_some())
            .finish()
    }
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_user_not_answer<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CallSession, &UserId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_user_not_answer = Some(Arc::new(f));
        self
    }

    pub fn with_on_remote_stream<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CallSession, &UserId, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_remote_stream = Some(Arc::new(f));
        self
    }

    pub fn with_on_session_connection_state_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CallSession, &UserId, SessionConnectionState) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.on_session_connection_state_changed = Some(Arc::new(f));
        self
    }

    pub fn with_on_session_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CallSession) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_session_close = Some(Arc::new(f));
        self
    }
}

/// Everything a factory needs to build a session
#[derive(Clone)]
pub struct SessionParams {
    pub session_id: SessionId,
    pub caller_id: UserId,
    pub opponent_ids: Vec<UserId>,
    pub call_type: CallType,
    /// Outbound channel for the session's own signaling messages
    pub signaling: Arc<dyn SignalingSender>,
    /// The local user
    pub current_user: UserId,
    pub hooks: SessionHooks,
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("session_id", &self.session_id)
            .field("caller_id", &self.caller_id)
            .field("opponent_ids", &self.opponent_ids)
            .field("call_type", &self.call_type)
            .field("current_user", &self.current_user)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Builds sessions for the registry
pub trait SessionFactory: Send + Sync {
    fn create_session(&self, params: SessionParams) -> SessionRef;
}

impl<F> SessionFactory for F
where
    F: Fn(SessionParams) -> SessionRef + Send + Sync,
{
    fn create_session(&self, params: SessionParams) -> SessionRef {
        self(params)
    }
}
