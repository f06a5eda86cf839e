//! Inbound signaling event routing
//!
//! The router is the bridge between the transport and the sessions. For every
//! event it finds (or, for "call", creates) the owning session, notifies the
//! application, then forwards the untouched payload to the session:
//!
//! ```text
//! transport ──▶ EventRouter::on_*(user, session id, payload)
//!                   │
//!                   ├─▶ SessionRegistry::lookup / get_or_create
//!                   ├─▶ ExtensionSanitizer::project ──▶ application callback
//!                   └─▶ CallSession::process_on_*(user, raw payload)
//! ```
//!
//! Events for unknown sessions (other than "call") are dropped with a warning;
//! they are expected after a session was cleared locally. A repeated "call" for
//! a known session is a retransmission: it reaches the session again but does
//! not notify the application a second time.
//!
//! Dispatch is serialized by a re-entrant lock, so events are applied one at a
//! time in the order the transport delivers them and callbacks may call back
//! into the client.

use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, warn};

use crate::call::{CallType, SessionId, UserId};
use crate::events::{invoke_isolated, CallCallback, CallHandlers};
use crate::extension::{self, Extension, ExtensionSanitizer};
use crate::session::SessionRef;
use crate::signaling::SignalKind;

use super::registry::SessionRegistry;

/// Routes inbound signaling events to sessions and application callbacks
pub struct EventRouter {
    registry: Arc<SessionRegistry>,
    sanitizer: ExtensionSanitizer,
    handlers: RwLock<CallHandlers>,
    dispatch_lock: ReentrantMutex<()>,
    trace_payloads: bool,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("sanitizer", &self.sanitizer)
            .field("handlers", &*self.handlers.read())
            .field("trace_payloads", &self.trace_payloads)
            .finish()
    }
}

impl EventRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        sanitizer: ExtensionSanitizer,
        handlers: CallHandlers,
        trace_payloads: bool,
    ) -> Self {
        Self {
            registry,
            sanitizer,
            handlers: RwLock::new(handlers),
            dispatch_lock: ReentrantMutex::new(()),
            trace_payloads,
        }
    }

    pub fn set_handlers(&self, handlers: CallHandlers) {
        *self.handlers.write() = handlers;
    }

    pub fn handlers(&self) -> CallHandlers {
        self.handlers.read().clone()
    }

    fn trace(&self, kind: SignalKind, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        if self.trace_payloads {
            let payload = serde_json::to_string(extension).unwrap_or_default();
            debug!(kind = %kind, user_id = %user_id, session_id = %session_id, payload = %payload, "Signaling event");
        } else {
            debug!(kind = %kind, user_id = %user_id, session_id = %session_id, "Signaling event");
        }
    }

    fn lookup_or_drop(&self, kind: SignalKind, session_id: &SessionId) -> Option<SessionRef> {
        let session = self.registry.lookup(session_id);
        if session.is_none() {
            warn!(
                kind = %kind,
                session_id = %session_id,
                "Ignoring '{}' event, there is no information about session {}",
                kind,
                session_id
            );
        }
        session
    }

    fn notify(&self, hook: &'static str, callback: Option<CallCallback>, session: &SessionRef, extension: &Extension) {
        if let Some(callback) = callback {
            invoke_isolated(hook, session.id(), || callback(session, extension));
        }
    }

    /// A call offer, either for a new session or a retransmission
    pub fn on_call(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        let _dispatch = self.dispatch_lock.lock();
        self.trace(SignalKind::Call, user_id, session_id, extension);

        let session = match self.registry.lookup(session_id) {
            Some(session) => {
                debug!(session_id = %session_id, "Repeated call event for known session");
                session
            }
            None => {
                let caller_id = extension::caller_id(extension).unwrap_or_else(|| user_id.clone());
                let call_type = extension::call_type(extension).unwrap_or_else(|| {
                    warn!(session_id = %session_id, "Call event without a valid call type, assuming {}", CallType::default());
                    CallType::default()
                });
                let opponent_ids = extension::opponent_ids(extension);

                let (session, created) =
                    self.registry
                        .get_or_create(session_id, caller_id, opponent_ids, call_type);
                if created {
                    let sanitized = self.sanitizer.project(extension);
                    let callback = self.handlers.read().on_call.clone();
                    self.notify("onCall", callback, &session, &sanitized);
                }
                session
            }
        };

        session.process_on_call(user_id, extension);
    }

    pub fn on_accept(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        let _dispatch = self.dispatch_lock.lock();
        self.trace(SignalKind::Accept, user_id, session_id, extension);

        let Some(session) = self.lookup_or_drop(SignalKind::Accept, session_id) else {
            return;
        };
        let sanitized = self.sanitizer.project(extension);
        let callback = self.handlers.read().on_accept_call.clone();
        self.notify("onAcceptCall", callback, &session, &sanitized);

        session.process_on_accept(user_id, extension);
    }

    pub fn on_reject(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        let _dispatch = self.dispatch_lock.lock();
        self.trace(SignalKind::Reject, user_id, session_id, extension);

        let Some(session) = self.lookup_or_drop(SignalKind::Reject, session_id) else {
            return;
        };
        let sanitized = self.sanitizer.project(extension);
        let callback = self.handlers.read().on_reject_call.clone();
        self.notify("onRejectCall", callback, &session, &sanitized);

        session.process_on_reject(user_id, extension);
    }

    pub fn on_stop(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        let _dispatch = self.dispatch_lock.lock();
        self.trace(SignalKind::Stop, user_id, session_id, extension);

        let Some(session) = self.lookup_or_drop(SignalKind::Stop, session_id) else {
            return;
        };
        let sanitized = self.sanitizer.project(extension);
        let callback = self.handlers.read().on_stop_call.clone();
        self.notify("onStopCall", callback, &session, &sanitized);

        session.process_on_stop(user_id, extension);
    }

    /// ICE candidates are protocol-internal and go to the session only
    pub fn on_ice_candidates(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        let _dispatch = self.dispatch_lock.lock();
        self.trace(SignalKind::IceCandidates, user_id, session_id, extension);
        debug!(
            session_id = %session_id,
            "{} ICE candidate(s) from {}",
            extension::ice_candidate_count(extension),
            user_id
        );

        let Some(session) = self.lookup_or_drop(SignalKind::IceCandidates, session_id) else {
            return;
        };
        session.process_on_ice_candidates(user_id, extension);
    }

    /// Update events hand the raw payload to the application callback
    pub fn on_update(&self, user_id: &UserId, session_id: &SessionId, extension: &Extension) {
        let _dispatch = self.dispatch_lock.lock();
        self.trace(SignalKind::Update, user_id, session_id, extension);

        let Some(session) = self.lookup_or_drop(SignalKind::Update, session_id) else {
            return;
        };
        let callback = self.handlers.read().on_update_call.clone();
        self.notify("onUpdateCall", callback, &session, extension);

        session.process_on_update(user_id, extension);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::SessionState;
    use crate::session::{CallSession, SessionHooks, SessionParams};
    use crate::signaling::ChannelSignalingSender;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// Session double that records what the router forwards
    #[derive(Debug)]
    struct RecordingSession {
        id: SessionId,
        caller_id: UserId,
        opponent_ids: Vec<UserId>,
        call_type: CallType,
        received: Mutex<Vec<(SignalKind, UserId, Extension)>>,
    }

    impl RecordingSession {
        fn received(&self) -> Vec<(SignalKind, UserId, Extension)> {
            self.received.lock().clone()
        }

        fn record(&self, kind: SignalKind, user_id: &UserId, extension: &Extension) {
            self.received.lock().push((kind, user_id.clone(), extension.clone()));
        }
    }

    impl CallSession for RecordingSession {
        fn id(&self) -> &SessionId {
            &self.id
        }
        fn caller_id(&self) -> &UserId {
            &self.caller_id
        }
        fn opponent_ids(&self) -> &[UserId] {
            &self.opponent_ids
        }
        fn call_type(&self) -> CallType {
            self.call_type
        }
        fn state(&self) -> SessionState {
            SessionState::New
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn process_on_call(&self, user_id: &UserId, extension: &Extension) {
            self.record(SignalKind::Call, user_id, extension);
        }
        fn process_on_accept(&self, user_id: &UserId, extension: &Extension) {
            self.record(SignalKind::Accept, user_id, extension);
        }
        fn process_on_reject(&self, user_id: &UserId, extension: &Extension) {
            self.record(SignalKind::Reject, user_id, extension);
        }
        fn process_on_stop(&self, user_id: &UserId, extension: &Extension) {
            self.record(SignalKind::Stop, user_id, extension);
        }
        fn process_on_ice_candidates(&self, user_id: &UserId, extension: &Extension) {
            self.record(SignalKind::IceCandidates, user_id, extension);
        }
        fn process_on_update(&self, user_id: &UserId, extension: &Extension) {
            self.record(SignalKind::Update, user_id, extension);
        }
    }

    fn recording(session: &SessionRef) -> &RecordingSession {
        session.as_any().downcast_ref::<RecordingSession>().unwrap()
    }

    fn router(handlers: CallHandlers) -> (EventRouter, Arc<SessionRegistry>) {
        let (sender, _rx) = ChannelSignalingSender::new();
        let factory = |params: SessionParams| -> SessionRef {
            Arc::new(RecordingSession {
                id: params.session_id,
                caller_id: params.caller_id,
                opponent_ids: params.opponent_ids,
                call_type: params.call_type,
                received: Mutex::new(Vec::new()),
            })
        };
        let registry = Arc::new(SessionRegistry::new(
            Arc::new(factory),
            Arc::new(sender),
            UserId::from("u2"),
            SessionHooks::new(),
        ));
        let router = EventRouter::new(registry.clone(), ExtensionSanitizer::default(), handlers, false);
        (router, registry)
    }

    fn ext(value: Value) -> Extension {
        value.as_object().cloned().unwrap()
    }

    fn offer() -> Extension {
        ext(json!({
            "callerID": "u1",
            "opponentsIDs": ["u2", "u3"],
            "callType": "AUDIO",
            "sdp": "v=0...",
            "platform": "web",
            "userInfo": {"name": "Alice"}
        }))
    }

    #[test]
    fn test_on_call_creates_session_from_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handlers = CallHandlers::new().with_on_call(move |session, extension| {
            sink.lock().push((session.id().clone(), extension.clone()));
            Ok(())
        });
        let (router, registry) = router(handlers);
        let id = SessionId::from("s-1");

        router.on_call(&UserId::from("u1"), &id, &offer());

        let session = registry.lookup(&id).unwrap();
        assert_eq!(session.caller_id(), &UserId::from("u1"));
        assert_eq!(session.opponent_ids(), &[UserId::from("u2"), UserId::from("u3")]);
        assert_eq!(session.call_type(), CallType::Audio);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, id);
        assert_eq!(seen[0].1, ext(json!({"userInfo": {"name": "Alice"}})));

        let received = recording(&session).received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, SignalKind::Call);
        assert_eq!(received[0].2, offer());
    }

    #[test]
    fn test_repeated_call_reaches_session_but_not_application() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handlers = CallHandlers::new().with_on_call(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let (router, registry) = router(handlers);
        let id = SessionId::from("s-1");

        for _ in 0..3 {
            router.on_call(&UserId::from("u1"), &id, &offer());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        let session = registry.lookup(&id).unwrap();
        assert_eq!(recording(&session).received().len(), 3);
    }

    #[test]
    fn test_call_without_identity_fields_falls_back_to_sender() {
        let (router, registry) = router(CallHandlers::new());
        let id = SessionId::from("s-2");

        router.on_call(&UserId::from("u5"), &id, &Extension::new());

        let session = registry.lookup(&id).unwrap();
        assert_eq!(session.caller_id(), &UserId::from("u5"));
        assert!(session.opponent_ids().is_empty());
        assert_eq!(session.call_type(), CallType::default());
    }

    #[test]
    fn test_accept_reject_stop_sanitize_for_application_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (accept_sink, reject_sink, stop_sink) = (seen.clone(), seen.clone(), seen.clone());
        let handlers = CallHandlers::new()
            .with_on_accept_call(move |_, e| {
                accept_sink.lock().push(("accept", e.clone()));
                Ok(())
            })
            .with_on_reject_call(move |_, e| {
                reject_sink.lock().push(("reject", e.clone()));
                Ok(())
            })
            .with_on_stop_call(move |_, e| {
                stop_sink.lock().push(("stop", e.clone()));
                Ok(())
            });
        let (router, registry) = router(handlers);
        let id = SessionId::from("s-1");
        router.on_call(&UserId::from("u1"), &id, &offer());

        let payload = ext(json!({"sdp": "a=answer", "platform": "ios", "reason": "busy"}));
        router.on_accept(&UserId::from("u3"), &id, &payload);
        router.on_reject(&UserId::from("u3"), &id, &payload);
        router.on_stop(&UserId::from("u1"), &id, &payload);

        let seen = seen.lock();
        let names: Vec<&str> = seen.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["accept", "reject", "stop"]);
        for (_, extension) in seen.iter() {
            assert_eq!(*extension, ext(json!({"reason": "busy"})));
        }

        let session = registry.lookup(&id).unwrap();
        let received = recording(&session).received();
        let kinds: Vec<SignalKind> = received.iter().map(|(kind, _, _)| *kind).collect();
        assert_eq!(
            kinds,
            vec![SignalKind::Call, SignalKind::Accept, SignalKind::Reject, SignalKind::Stop]
        );
        for (_, _, extension) in &received[1..] {
            assert_eq!(*extension, payload);
        }
    }

    #[test]
    #[traced_test]
    fn test_events_for_unknown_session_are_dropped() {
        let fired = Arc::new(AtomicUsize::new(0));
        let (a, r, s, u) = (fired.clone(), fired.clone(), fired.clone(), fired.clone());
        let handlers = CallHandlers::new()
            .with_on_accept_call(move |_, _| {
                a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_on_reject_call(move |_, _| {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_on_stop_call(move |_, _| {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .with_on_update_call(move |_, _| {
                u.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        let (router, registry) = router(handlers);
        let id = SessionId::from("unknown-id");
        let user = UserId::from("u3");

        router.on_accept(&user, &id, &Extension::new());
        router.on_reject(&user, &id, &Extension::new());
        router.on_stop(&user, &id, &Extension::new());
        router.on_ice_candidates(&user, &id, &ext(json!({"iceCandidates": []})));
        router.on_update(&user, &id, &Extension::new());

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
        assert!(logs_contain("there is no information about session unknown-id"));
    }

    #[test]
    fn test_ice_candidates_bypass_application() {
        let (router, registry) = router(CallHandlers::new());
        let id = SessionId::from("s-1");
        router.on_call(&UserId::from("u1"), &id, &offer());

        let candidates = ext(json!({"iceCandidates": [{"candidate": "a"}], "sdp": "x"}));
        router.on_ice_candidates(&UserId::from("u1"), &id, &candidates);

        let session = registry.lookup(&id).unwrap();
        let received = recording(&session).received();
        assert_eq!(received[1].0, SignalKind::IceCandidates);
        assert_eq!(received[1].2, candidates);
    }

    #[test]
    fn test_update_passes_raw_payload_to_application() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handlers = CallHandlers::new().with_on_update_call(move |_, e| {
            sink.lock().push(e.clone());
            Ok(())
        });
        let (router, registry) = router(handlers);
        let id = SessionId::from("s-1");
        router.on_call(&UserId::from("u1"), &id, &offer());

        let update = ext(json!({"platform": "web", "muted": true}));
        router.on_update(&UserId::from("u1"), &id, &update);

        assert_eq!(*seen.lock(), vec![update.clone()]);
        let session = registry.lookup(&id).unwrap();
        assert_eq!(recording(&session).received()[1].2, update);
    }

    #[test]
    #[traced_test]
    fn test_failing_callback_does_not_block_session() {
        let handlers = CallHandlers::new()
            .with_on_call(|_, _| Err(anyhow::anyhow!("listener exploded")))
            .with_on_accept_call(|_, _| panic!("listener panicked"));
        let (router, registry) = router(handlers);
        let id = SessionId::from("s-1");

        router.on_call(&UserId::from("u1"), &id, &offer());
        router.on_accept(&UserId::from("u3"), &id, &Extension::new());
        router.on_stop(&UserId::from("u1"), &id, &Extension::new());

        let session = registry.lookup(&id).unwrap();
        assert_eq!(recording(&session).received().len(), 3);
        assert!(logs_contain("listener exploded"));
        assert!(logs_contain("listener panicked"));
    }

    #[test]
    fn test_callbacks_may_reenter_the_router() {
        let (router, registry) = router(CallHandlers::new());
        let router = Arc::new(router);
        let inner = Arc::downgrade(&router);
        router.set_handlers(CallHandlers::new().with_on_stop_call(move |session, _| {
            if let Some(router) = inner.upgrade() {
                router.on_update(&UserId::from("u1"), session.id(), &Extension::new());
            }
            Ok(())
        }));
        let id = SessionId::from("s-1");
        router.on_call(&UserId::from("u1"), &id, &offer());

        router.on_stop(&UserId::from("u1"), &id, &Extension::new());

        let session = registry.lookup(&id).unwrap();
        let kinds: Vec<SignalKind> = recording(&session).received().iter().map(|(k, _, _)| *k).collect();
        assert_eq!(kinds, vec![SignalKind::Call, SignalKind::Update, SignalKind::Stop]);
    }
}
