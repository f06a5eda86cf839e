//! Registry of live call sessions
//!
//! Maps session ids to exactly one session for as long as the id stays
//! registered. Entries are only removed by [`SessionRegistry::remove`]: a
//! session that hung up or was rejected stays registered until its owner clears
//! it, so late signaling for that session still finds it. Callers that never
//! clear terminated sessions grow the registry without bound.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::call::{CallType, SessionId, SessionState, UserId};
use crate::error::{ClientError, ClientResult};
use crate::session::{SessionFactory, SessionHooks, SessionParams, SessionRef};
use crate::signaling::SignalingSender;

/// Session id to session mapping with creation through a [`SessionFactory`]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionRef>,
    factory: Arc<dyn SessionFactory>,
    signaling: Arc<dyn SignalingSender>,
    current_user: UserId,
    /// Hooks handed to sessions created from now on
    hooks: RwLock<SessionHooks>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("current_user", &self.current_user)
            .field("sessions", &self.sessions.len())
            .field("hooks", &*self.hooks.read())
            .finish()
    }
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        signaling: Arc<dyn SignalingSender>,
        current_user: UserId,
        hooks: SessionHooks,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            factory,
            signaling,
            current_user,
            hooks: RwLock::new(hooks),
        }
    }

    pub fn current_user(&self) -> &UserId {
        &self.current_user
    }

    /// Replace the hooks captured by sessions created after this call
    pub fn set_hooks(&self, hooks: SessionHooks) {
        *self.hooks.write() = hooks;
    }

    fn build(&self, session_id: SessionId, caller_id: UserId, opponent_ids: Vec<UserId>, call_type: CallType) -> SessionRef {
        // Snapshot first; the factory may re-enter the registry
        let hooks = self.hooks.read().clone();
        self.factory.create_session(SessionParams {
            session_id,
            caller_id,
            opponent_ids,
            call_type,
            signaling: Arc::clone(&self.signaling),
            current_user: self.current_user.clone(),
            hooks,
        })
    }

    /// Create and register an outgoing session with the local user as caller
    pub fn create(&self, opponent_ids: Vec<UserId>, call_type: CallType) -> ClientResult<SessionRef> {
        if opponent_ids.is_empty() {
            return Err(ClientError::invalid_argument("a call needs at least one opponent"));
        }

        loop {
            let session_id = SessionId::new();
            if self.sessions.contains_key(&session_id) {
                continue;
            }
            let session = self.build(
                session_id.clone(),
                self.current_user.clone(),
                opponent_ids.clone(),
                call_type,
            );
            match self.sessions.entry(session_id) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::clone(&session));
                    info!(
                        session_id = %session.id(),
                        "Created outgoing {} session to {} opponent(s)",
                        call_type,
                        opponent_ids.len()
                    );
                    return Ok(session);
                }
            }
        }
    }

    /// Return the session registered under `session_id`, creating it if needed
    ///
    /// The flag is `true` when this call created the session. For an existing
    /// session the supplied identity fields are ignored.
    pub fn get_or_create(
        &self,
        session_id: &SessionId,
        caller_id: UserId,
        opponent_ids: Vec<UserId>,
        call_type: CallType,
    ) -> (SessionRef, bool) {
        if let Some(existing) = self.lookup(session_id) {
            return (existing, false);
        }

        // Built outside the map so factories may call back into the registry
        let session = self.build(session_id.clone(), caller_id, opponent_ids, call_type);
        match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(occupied) => {
                debug!(session_id = %session_id, "Session registered concurrently, keeping the first one");
                (Arc::clone(occupied.get()), false)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&session));
                info!(
                    session_id = %session_id,
                    "Registered incoming {} session from {}",
                    session.call_type(),
                    session.caller_id()
                );
                (session, true)
            }
        }
    }

    pub fn lookup(&self, session_id: &SessionId) -> Option<SessionRef> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Unregister a session; unknown ids are ignored
    pub fn remove(&self, session_id: &SessionId) -> Option<SessionRef> {
        let removed = self.sessions.remove(session_id).map(|(_, session)| session);
        if removed.is_some() {
            info!(session_id = %session_id, "Cleared session");
        } else {
            debug!(session_id = %session_id, "Clear requested for unknown session");
        }
        removed
    }

    fn has_state(&self, session_id: &SessionId, state: SessionState) -> bool {
        self.lookup(session_id)
            .map_or(false, |session| session.state() == state)
    }

    pub fn is_active(&self, session_id: &SessionId) -> bool {
        self.has_state(session_id, SessionState::Active)
    }

    pub fn is_rejected(&self, session_id: &SessionId) -> bool {
        self.has_state(session_id, SessionState::Rejected)
    }

    pub fn is_hung_up(&self, session_id: &SessionId) -> bool {
        self.has_state(session_id, SessionState::HungUp)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Registered ids in ascending order
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SignalingSessionFactory;
    use crate::signaling::ChannelSignalingSender;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, OnceLock};
    use std::thread;
    use std::time::Duration;

    fn registry() -> SessionRegistry {
        let (sender, _rx) = ChannelSignalingSender::new();
        SessionRegistry::new(
            Arc::new(SignalingSessionFactory::new()),
            Arc::new(sender),
            UserId::from("u1"),
            SessionHooks::new(),
        )
    }

    #[test]
    fn test_create_registers_outgoing_session() {
        let registry = registry();
        let session = registry
            .create(vec![UserId::from("u2"), UserId::from("u3")], CallType::Video)
            .unwrap();

        assert_eq!(session.caller_id(), &UserId::from("u1"));
        assert_eq!(session.opponent_ids(), &[UserId::from("u2"), UserId::from("u3")]);
        assert_eq!(session.state(), SessionState::New);
        assert!(registry.lookup(session.id()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_rejects_empty_opponents() {
        let registry = registry();
        let err = registry.create(Vec::new(), CallType::Audio).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_or_create_first_writer_wins() {
        let registry = registry();
        let id = SessionId::from("s-1");

        let (first, created) =
            registry.get_or_create(&id, UserId::from("u9"), vec![UserId::from("u1")], CallType::Audio);
        assert!(created);

        let (second, created) =
            registry.get_or_create(&id, UserId::from("u8"), vec![UserId::from("u7")], CallType::Video);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.caller_id(), &UserId::from("u9"));
        assert_eq!(second.call_type(), CallType::Audio);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_state_predicates_for_unknown_session() {
        let registry = registry();
        let id = SessionId::from("missing");
        assert!(!registry.is_active(&id));
        assert!(!registry.is_rejected(&id));
        assert!(!registry.is_hung_up(&id));
        assert!(registry.lookup(&id).is_none());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn test_state_predicates_follow_session_state() {
        let registry = registry();
        let session = registry.create(vec![UserId::from("u2")], CallType::Video).unwrap();
        let id = session.id().clone();

        session.process_on_accept(&UserId::from("u2"), &Map::new());
        assert!(registry.is_active(&id));
        assert!(!registry.is_hung_up(&id));

        session.process_on_stop(&UserId::from("u2"), &Map::new());
        assert!(registry.is_hung_up(&id));
        assert!(!registry.is_active(&id));

        // Terminal sessions stay registered until removed
        assert_eq!(registry.session_ids(), vec![id.clone()]);
        registry.remove(&id);
        assert!(!registry.is_hung_up(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_factory_may_reenter_registry() {
        let slot: Arc<OnceLock<Arc<SessionRegistry>>> = Arc::new(OnceLock::new());
        let inner = Arc::clone(&slot);
        let reentered = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reentered);
        let factory = move |params: SessionParams| -> SessionRef {
            if let Some(registry) = inner.get() {
                registry.set_hooks(SessionHooks::new());
                assert!(registry.lookup(&params.session_id).is_none());
                counter.fetch_add(1, Ordering::SeqCst);
            }
            SignalingSessionFactory::new().create_session(params)
        };

        let (sender, _rx) = ChannelSignalingSender::new();
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(factory),
            Arc::new(sender),
            UserId::from("u1"),
            SessionHooks::new(),
        ));
        assert!(slot.set(Arc::clone(&registry)).is_ok());

        let (done_tx, done_rx) = mpsc::channel();
        let worker = Arc::clone(&registry);
        thread::spawn(move || {
            let outgoing = worker.create(vec![UserId::from("u2")], CallType::Video).is_ok();
            let (_, created) = worker.get_or_create(
                &SessionId::from("s-in"),
                UserId::from("u3"),
                vec![UserId::from("u1")],
                CallType::Audio,
            );
            let _ = done_tx.send(outgoing && created);
        });

        let finished = done_rx.recv_timeout(Duration::from_secs(3));
        assert_eq!(finished, Ok(true));
        assert_eq!(reentered.load(Ordering::SeqCst), 2);
        assert_eq!(registry.len(), 2);
    }
}

