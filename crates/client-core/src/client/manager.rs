//! The call client facade and its single-instance context

use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::call::{CallType, SessionId, UserId};
use crate::error::{ClientError, ClientResult};
use crate::events::CallHandlers;
use crate::extension::Extension;
use crate::session::{SessionHooks, SessionRef};
use crate::signaling::{SignalKind, SignalingEvent};

use super::builder::CallClientBuilder;
use super::config::ClientConfig;
use super::registry::SessionRegistry;
use super::router::EventRouter;

/// Entry point for applications and the signaling transport
///
/// Applications place calls, query and clear sessions; the transport delivers
/// inbound events through the `on_*` methods or [`CallClient::dispatch`].
/// Clients are built with [`CallClient::builder`] into a [`ClientContext`],
/// which holds at most one per context; [`CallClient::global`] reads the
/// process-wide one.
#[derive(Debug)]
pub struct CallClient {
    config: ClientConfig,
    current_user: UserId,
    registry: Arc<SessionRegistry>,
    router: EventRouter,
}

impl CallClient {
    pub fn builder() -> CallClientBuilder {
        CallClientBuilder::new()
    }

    pub(crate) fn from_parts(
        config: ClientConfig,
        current_user: UserId,
        registry: Arc<SessionRegistry>,
        router: EventRouter,
    ) -> Self {
        Self {
            config,
            current_user,
            registry,
            router,
        }
    }

    /// The process-wide client, if one was built with [`CallClientBuilder::build_global`]
    pub fn global() -> Option<Arc<CallClient>> {
        GLOBAL_CONTEXT.get()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn current_user(&self) -> &UserId {
        &self.current_user
    }

    /// Start an outgoing call from the local user to `opponent_ids`
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidArgument` when `opponent_ids` is empty.
    pub fn create_call(&self, opponent_ids: Vec<UserId>, call_type: CallType) -> ClientResult<SessionRef> {
        self.registry.create(opponent_ids, call_type)
    }

    /// Forget a session; the owner must call this once a call has ended
    pub fn clear_session(&self, session_id: &SessionId) {
        self.registry.remove(session_id);
    }

    pub fn session(&self, session_id: &SessionId) -> Option<SessionRef> {
        self.registry.lookup(session_id)
    }

    pub fn is_session_active(&self, session_id: &SessionId) -> bool {
        self.registry.is_active(session_id)
    }

    pub fn is_session_rejected(&self, session_id: &SessionId) -> bool {
        self.registry.is_rejected(session_id)
    }

    pub fn is_session_hung_up(&self, session_id: &SessionId) -> bool {
        self.registry.is_hung_up(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.session_ids()
    }

    /// Replace the application callbacks used for subsequent events
    pub fn set_call_handlers(&self, handlers: CallHandlers) {
        self.router.set_handlers(handlers);
    }

    pub fn call_handlers(&self) -> CallHandlers {
        self.router.handlers()
    }

    /// Replace the hooks captured by sessions created from now on
    ///
    /// Sessions that already exist keep the hooks they were created with.
    pub fn set_session_hooks(&self, hooks: SessionHooks) {
        self.registry.set_hooks(hooks);
    }

    pub fn on_call(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        self.router.on_call(user_id, session_id, extension);
    }

    pub fn on_accept(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        self.router.on_accept(user_id, session_id, extension);
    }

    pub fn on_reject(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        self.router.on_reject(user_id, session_id, extension);
    }

    pub fn on_stop(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        self.router.on_stop(user_id, session_id, extension);
    }

    pub fn on_ice_candidates(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        self.router.on_ice_candidates(user_id, session_id, extension);
    }

    pub fn on_update(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        self.router.on_update(user_id, session_id, extension);
    }

    /// Route a decoded signaling event to the matching entry point
    pub fn dispatch(&self, event: &SignalingEvent) {
        let SignalingEvent {
            kind,
            user_id,
            session_id,
            extension,
        } = event;
        match kind {
            SignalKind::Call => self.on_call(user_id, session_id, extension),
            SignalKind::Accept => self.on_accept(user_id, session_id, extension),
            SignalKind::Reject => self.on_reject(user_id, session_id, extension),
            SignalKind::Stop => self.on_stop(user_id, session_id, extension),
            SignalKind::IceCandidates => self.on_ice_candidates(user_id, session_id, extension),
            SignalKind::Update => self.on_update(user_id, session_id, extension),
        }
    }
}

/// Holder that allows at most one [`CallClient`] to be built
///
/// Construct one at startup and share it; every later construction attempt
/// through the context returns the client that already exists.
#[derive(Debug, Default)]
pub struct ClientContext {
    client: OnceLock<Arc<CallClient>>,
}

impl ClientContext {
    pub const fn new() -> Self {
        Self {
            client: OnceLock::new(),
        }
    }

    pub fn get(&self) -> Option<Arc<CallClient>> {
        self.client.get().cloned()
    }

    /// Return the existing client or install the one produced by `init`
    ///
    /// `init` only runs while the context is empty; its error is returned
    /// without installing anything.
    pub fn get_or_try_init<F>(&self, init: F) -> ClientResult<Arc<CallClient>>
    where
        F: FnOnce() -> ClientResult<CallClient>,
    {
        if let Some(client) = self.client.get() {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(init()?);
        if self.client.set(Arc::clone(&client)).is_ok() {
            info!("Call client initialized for user {}", client.current_user());
        }
        self.client
            .get()
            .cloned()
            .ok_or_else(|| ClientError::internal("client context is empty after initialization"))
    }
}

pub(crate) static GLOBAL_CONTEXT: ClientContext = ClientContext::new();
