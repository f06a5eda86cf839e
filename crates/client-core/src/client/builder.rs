//! Fluent builder for [`CallClient`]
//!
//! The builder collects the configuration, the two external collaborators
//! (a [`SessionFactory`] and the outbound [`SignalingSender`]) and the
//! application callbacks, then validates them in one place. A client is only
//! ever built into a [`ClientContext`]: [`CallClientBuilder::build_in`] for a
//! context the caller owns, [`CallClientBuilder::build_global`] for the
//! process-wide one. Building again returns the client already installed.
//!
//! ```rust
//! use rtcall_client_core::{
//!     CallClient, CallType, ChannelSignalingSender, ClientContext, SignalingSessionFactory, UserId,
//! };
//!
//! let context = ClientContext::new();
//! let (sender, _outbound) = ChannelSignalingSender::new();
//! let client = CallClient::builder()
//!     .user_id("u1")
//!     .session_factory(SignalingSessionFactory::new())
//!     .signaling(sender)
//!     .on_call(|session, _extension| {
//!         println!("incoming call from {}", session.caller_id());
//!         Ok(())
//!     })
//!     .build_in(&context)
//!     .expect("valid client configuration");
//!
//! let session = client.create_call(vec![UserId::from("u2")], CallType::Audio).unwrap();
//! assert_eq!(session.caller_id().as_str(), "u1");
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::call::{SessionConnectionState, UserId};
use crate::error::{ClientError, ClientResult};
use crate::events::CallHandlers;
use crate::extension::Extension;
use crate::session::{CallSession, SessionFactory, SessionHooks, SessionRef};
use crate::signaling::SignalingSender;

use super::config::ClientConfig;
use super::manager::{CallClient, ClientContext, GLOBAL_CONTEXT};
use super::registry::SessionRegistry;
use super::router::EventRouter;

/// Builder for [`CallClient`]
#[derive(Default)]
pub struct CallClientBuilder {
    config: ClientConfig,
    factory: Option<Arc<dyn SessionFactory>>,
    signaling: Option<Arc<dyn SignalingSender>>,
    handlers: CallHandlers,
    hooks: SessionHooks,
}

impl std::fmt::Debug for CallClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallClientBuilder")
            .field("config", &self.config)
            .field("factory", &self.factory.is_some())
            .field("signaling", &self.signaling.is_some())
            .field("handlers", &self.handlers)
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl CallClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn user_id(mut self, user_id: impl Into<UserId>) -> Self {
        self.config.user_id = Some(user_id.into());
        self
    }

    /// Derive the local user id from a chat JID
    pub fn jid(mut self, jid: impl Into<String>) -> Self {
        self.config.jid = Some(jid.into());
        self
    }

    pub fn trace_payloads(mut self, enabled: bool) -> Self {
        self.config.trace_payloads = enabled;
        self
    }

    /// Remove `key` from application payloads as well
    pub fn sanitize_key(mut self, key: impl Into<String>) -> Self {
        self.config.extra_sanitized_keys.push(key.into());
        self
    }

    pub fn session_factory(mut self, factory: impl SessionFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn signaling(mut self, sender: impl SignalingSender + 'static) -> Self {
        self.signaling = Some(Arc::new(sender));
        self
    }

    pub fn handlers(mut self, handlers: CallHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn session_hooks(mut self, hooks: SessionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn on_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers = self.handlers.with_on_call(f);
        self
    }

    pub fn on_accept_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers = self.handlers.with_on_accept_call(f);
        self
    }

    pub fn on_reject_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers = self.handlers.with_on_reject_call(f);
        self
    }

    pub fn on_stop_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers = self.handlers.with_on_stop_call(f);
        self
    }

    pub fn on_update_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers = self.handlers.with_on_update_call(f);
        self
    }

    pub fn on_user_not_answer<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CallSession, &UserId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.with_on_user_not_answer(f);
        self
    }

    pub fn on_remote_stream<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CallSession, &UserId, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.with_on_remote_stream(f);
        self
    }

    pub fn on_session_connection_state_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CallSession, &UserId, SessionConnectionState) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.hooks = self.hooks.with_on_session_connection_state_changed(f);
        self
    }

    pub fn on_session_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn CallSession) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks = self.hooks.with_on_session_close(f);
        self
    }

    /// Validate the collected settings and assemble the client
    ///
    /// Only reachable through a [`ClientContext`], which keeps the client unique.
    pub(crate) fn build(self) -> ClientResult<CallClient> {
        let current_user = self.config.resolve_user_id()?;
        let factory = self
            .factory
            .ok_or_else(|| ClientError::configuration("a session factory is required"))?;
        let signaling = self
            .signaling
            .ok_or_else(|| ClientError::configuration("a signaling sender is required"))?;

        let registry = Arc::new(SessionRegistry::new(
            factory,
            signaling,
            current_user.clone(),
            self.hooks,
        ));
        let router = EventRouter::new(
            Arc::clone(&registry),
            self.config.sanitizer(),
            self.handlers,
            self.config.trace_payloads,
        );
        debug!(user_id = %current_user, "Built call client");

        Ok(CallClient::from_parts(self.config, current_user, registry, router))
    }

    /// Build into `context`, or return the client it already holds
    ///
    /// When the context is already populated the builder is discarded without
    /// validation and the existing client is returned unchanged.
    ///
    /// # Errors
    ///
    /// `ClientError::Configuration` when no local user id can be resolved or
    /// when the session factory or signaling sender is missing. The context
    /// stays empty in that case.
    pub fn build_in(self, context: &ClientContext) -> ClientResult<Arc<CallClient>> {
        context.get_or_try_init(|| self.build())
    }

    /// Build the process-wide client, or return the existing one
    ///
    /// # Errors
    ///
    /// Same as [`CallClientBuilder::build_in`].
    pub fn build_global(self) -> ClientResult<Arc<CallClient>> {
        self.build_in(&GLOBAL_CONTEXT)
    }
}
