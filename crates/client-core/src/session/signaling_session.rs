//! Signaling-only session state machine
//!
//! [`SignalingSession`] tracks a call purely from its signaling traffic: who
//! accepted, rejected or stopped, the last session description and the ICE
//! candidates each participant sent, and the resulting [`SessionState`]. It
//! does not open peer connections. A media layer drives the remaining hooks
//! through [`SignalingSession::report_connection_state`] and
//! [`SignalingSession::report_remote_stream`].
//!
//! State transitions:
//!
//! ```text
//! NEW ──accept──────────────────────────▶ ACTIVE
//!  │                                        │
//!  ├──every opponent rejected (caller)──▶ REJECTED
//!  ├──local reject (callee)─────────────▶ REJECTED
//!  └──stop by caller / all opponents────▶ HUNGUP ◀──┘
//! any non-terminal ──close()────────────▶ CLOSED
//! ```

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CallSession, SessionFactory, SessionHooks, SessionParams, SessionRef};
use crate::call::{CallType, SessionConnectionState, SessionId, SessionState, UserId};
use crate::error::{ClientError, ClientResult};
use crate::events::invoke_isolated;
use crate::extension::{self, Extension, KEY_CALLER_ID, KEY_CALL_TYPE, KEY_ICE_CANDIDATES, KEY_OPPONENTS_IDS};
use crate::signaling::{OutboundSignal, SignalKind, SignalingSender};

struct SessionActivity {
    accepted: HashSet<UserId>,
    rejected: HashSet<UserId>,
    stopped: HashSet<UserId>,
    remote_sdp: HashMap<UserId, String>,
    ice_candidates: HashMap<UserId, Vec<Value>>,
    last_update: HashMap<UserId, Extension>,
    started_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    close_notified: bool,
}

impl SessionActivity {
    fn new() -> Self {
        Self {
            accepted: HashSet::new(),
            rejected: HashSet::new(),
            stopped: HashSet::new(),
            remote_sdp: HashMap::new(),
            ice_candidates: HashMap::new(),
            last_update: HashMap::new(),
            started_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            close_notified: false,
        }
    }
}

/// Session implementation that follows the call through signaling alone
pub struct SignalingSession {
    id: SessionId,
    caller_id: UserId,
    opponent_ids: Vec<UserId>,
    call_type: CallType,
    current_user: UserId,
    signaling: Arc<dyn SignalingSender>,
    hooks: SessionHooks,
    state: RwLock<SessionState>,
    activity: Mutex<SessionActivity>,
}

impl fmt::Debug for SignalingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingSession")
            .field("id", &self.id)
            .field("caller_id", &self.caller_id)
            .field("opponent_ids", &self.opponent_ids)
            .field("call_type", &self.call_type)
            .field("current_user", &self.current_user)
            .field("state", &*self.state.read())
            .finish()
    }
}

impl SignalingSession {
    pub fn new(params: SessionParams) -> Self {
        Self {
            id: params.session_id,
            caller_id: params.caller_id,
            opponent_ids: params.opponent_ids,
            call_type: params.call_type,
            current_user: params.current_user,
            signaling: params.signaling,
            hooks: params.hooks,
            state: RwLock::new(SessionState::New),
            activity: Mutex::new(SessionActivity::new()),
        }
    }

    /// Whether the local user initiated this call
    pub fn is_initiator(&self) -> bool {
        self.current_user == self.caller_id
    }

    /// Everyone in the call except the local user
    pub fn remote_participants(&self) -> Vec<UserId> {
        let mut participants = Vec::with_capacity(self.opponent_ids.len() + 1);
        for user in std::iter::once(&self.caller_id).chain(self.opponent_ids.iter()) {
            if *user != self.current_user && !participants.contains(user) {
                participants.push(user.clone());
            }
        }
        participants
    }

    /// Opponents other than the local user
    fn answering_opponents(&self) -> impl Iterator<Item = &UserId> {
        self.opponent_ids.iter().filter(move |id| **id != self.current_user)
    }

    pub fn accepted_by(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.activity.lock().accepted.iter().cloned().collect();
        users.sort();
        users
    }

    pub fn remote_sdp(&self, user_id: &UserId) -> Option<String> {
        self.activity.lock().remote_sdp.get(user_id).cloned()
    }

    pub fn ice_candidates(&self, user_id: &UserId) -> Vec<Value> {
        self.activity
            .lock()
            .ice_candidates
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_update(&self, user_id: &UserId) -> Option<Extension> {
        self.activity.lock().last_update.get(user_id).cloned()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.activity.lock().started_at
    }

    pub fn answered_at(&self) -> Option<DateTime<Utc>> {
        self.activity.lock().answered_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.activity.lock().ended_at
    }

    fn is_terminal(&self) -> bool {
        self.state.read().is_terminal()
    }

    /// Move to `to` if the current state is one of `from`
    fn transition(&self, from: &[SessionState], to: SessionState) -> bool {
        let previous = {
            let mut state = self.state.write();
            if !from.contains(&*state) {
                return false;
            }
            std::mem::replace(&mut *state, to)
        };
        info!(session_id = %self.id, "Session state {} -> {}", previous, to);

        let now = Utc::now();
        let notify_close = {
            let mut activity = self.activity.lock();
            if to == SessionState::Active && activity.answered_at.is_none() {
                activity.answered_at = Some(now);
            }
            if to.is_terminal() {
                activity.ended_at.get_or_insert(now);
                !std::mem::replace(&mut activity.close_notified, true)
            } else {
                false
            }
        };

        if notify_close {
            if let Some(hook) = self.hooks.on_session_close.clone() {
                invoke_isolated("onSessionClose", &self.id, || hook(self as &dyn CallSession));
            }
        }
        true
    }

    fn record_sdp(&self, user_id: &UserId, extension: &Extension) {
        if let Some(sdp) = extension::sdp(extension) {
            self.activity
                .lock()
                .remote_sdp
                .insert(user_id.clone(), sdp.to_string());
        }
    }

    async fn send_to(&self, kind: SignalKind, recipients: &[UserId], extension: &Extension) -> ClientResult<()> {
        for to in recipients {
            self.signaling
                .send(OutboundSignal {
                    kind,
                    to: to.clone(),
                    session_id: self.id.clone(),
                    extension: extension.clone(),
                })
                .await?;
        }
        debug!(session_id = %self.id, "Sent {} to {} participant(s)", kind, recipients.len());
        Ok(())
    }

    /// Ring every opponent; only the initiator of a new session may call
    pub async fn call(&self, mut extension: Extension) -> ClientResult<()> {
        if !self.is_initiator() || *self.state.read() != SessionState::New {
            return Err(ClientError::invalid_state(format!(
                "session {} cannot place a call in state {}",
                self.id,
                self.state()
            )));
        }

        extension.insert(KEY_CALLER_ID.to_string(), Value::String(self.caller_id.0.clone()));
        extension.insert(
            KEY_OPPONENTS_IDS.to_string(),
            Value::Array(self.opponent_ids.iter().map(|id| Value::String(id.0.clone())).collect()),
        );
        extension.insert(KEY_CALL_TYPE.to_string(), Value::String(self.call_type.to_string()));

        let opponents: Vec<UserId> = self.answering_opponents().cloned().collect();
        self.send_to(SignalKind::Call, &opponents, &extension).await
    }

    /// Answer an incoming call
    pub async fn accept(&self, extension: Extension) -> ClientResult<()> {
        if !self.transition(&[SessionState::New], SessionState::Active) {
            return Err(ClientError::invalid_state(format!(
                "session {} cannot be accepted in state {}",
                self.id,
                self.state()
            )));
        }
        self.send_to(SignalKind::Accept, &self.remote_participants(), &extension).await
    }

    /// Decline an incoming call
    pub async fn reject(&self, extension: Extension) -> ClientResult<()> {
        if !self.transition(&[SessionState::New], SessionState::Rejected) {
            return Err(ClientError::invalid_state(format!(
                "session {} cannot be rejected in state {}",
                self.id,
                self.state()
            )));
        }
        self.send_to(SignalKind::Reject, &self.remote_participants(), &extension).await
    }

    /// Hang up the call for every participant
    pub async fn stop(&self, extension: Extension) -> ClientResult<()> {
        if !self.transition(&[SessionState::New, SessionState::Active], SessionState::HungUp) {
            return Err(ClientError::invalid_state(format!(
                "session {} cannot be stopped in state {}",
                self.id,
                self.state()
            )));
        }
        self.send_to(SignalKind::Stop, &self.remote_participants(), &extension).await
    }

    /// Send application data to every participant of an ongoing call
    pub async fn update(&self, extension: Extension) -> ClientResult<()> {
        if self.is_terminal() {
            return Err(ClientError::invalid_state(format!(
                "session {} is already {}",
                self.id,
                self.state()
            )));
        }
        self.send_to(SignalKind::Update, &self.remote_participants(), &extension).await
    }

    /// Release the session locally without notifying anyone
    pub fn close(&self) {
        self.transition(
            &[SessionState::New, SessionState::Active],
            SessionState::Closed,
        );
    }

    /// Forward a peer connection state change from the media layer
    pub fn report_connection_state(&self, user_id: &UserId, state: SessionConnectionState) {
        if let Some(hook) = self.hooks.on_session_connection_state_changed.clone() {
            invoke_isolated("onSessionConnectionStateChanged", &self.id, || {
                hook(self as &dyn CallSession, user_id, state)
            });
        }
    }

    /// Forward a newly available remote stream from the media layer
    pub fn report_remote_stream(&self, user_id: &UserId, stream_id: &str) {
        if let Some(hook) = self.hooks.on_remote_stream.clone() {
            invoke_isolated("onRemoteStream", &self.id, || {
                hook(self as &dyn CallSession, user_id, stream_id)
            });
        }
    }

    /// Report every opponent that neither accepted nor rejected yet
    ///
    /// Does nothing once the call left the `NEW` state or when the local user is
    /// not the initiator.
    pub fn check_unanswered(&self) -> Vec<UserId> {
        if !self.is_initiator() || self.state() != SessionState::New {
            return Vec::new();
        }
        let unanswered: Vec<UserId> = {
            let activity = self.activity.lock();
            self.answering_opponents()
                .filter(|id| !activity.accepted.contains(*id) && !activity.rejected.contains(*id))
                .cloned()
                .collect()
        };

        if let Some(hook) = self.hooks.on_user_not_answer.clone() {
            for user_id in &unanswered {
                invoke_isolated("onUserNotAnswer", &self.id, || {
                    hook(self as &dyn CallSession, user_id)
                });
            }
        }
        unanswered
    }
}

impl CallSession for SignalingSession {
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
        *self.state.read()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn process_on_call(&self, user_id: &UserId, extension: &Extension) {
        if self.is_terminal() {
            debug!(session_id = %self.id, "Ignoring call from {} in state {}", user_id, self.state());
            return;
        }
        self.record_sdp(user_id, extension);
    }

    fn process_on_accept(&self, user_id: &UserId, extension: &Extension) {
        if self.is_terminal() {
            debug!(session_id = %self.id, "Ignoring accept from {} in state {}", user_id, self.state());
            return;
        }
        self.activity.lock().accepted.insert(user_id.clone());
        self.record_sdp(user_id, extension);
        self.transition(&[SessionState::New], SessionState::Active);
    }

    fn process_on_reject(&self, user_id: &UserId, _extension: &Extension) {
        if self.is_terminal() {
            debug!(session_id = %self.id, "Ignoring reject from {} in state {}", user_id, self.state());
            return;
        }
        let everyone_rejected = {
            let mut activity = self.activity.lock();
            activity.rejected.insert(user_id.clone());
            self.answering_opponents().all(|id| activity.rejected.contains(id))
        };
        if self.is_initiator() && everyone_rejected {
            self.transition(&[SessionState::New], SessionState::Rejected);
        }
    }

    fn process_on_stop(&self, user_id: &UserId, _extension: &Extension) {
        if self.is_terminal() {
            debug!(session_id = %self.id, "Ignoring stop from {} in state {}", user_id, self.state());
            return;
        }
        let everyone_left = {
            let mut activity = self.activity.lock();
            activity.stopped.insert(user_id.clone());
            self.answering_opponents()
                .all(|id| activity.stopped.contains(id) || activity.rejected.contains(id))
        };
        if *user_id == self.caller_id || (self.is_initiator() && everyone_left) {
            self.transition(&[SessionState::New, SessionState::Active], SessionState::HungUp);
        }
    }

    fn process_on_ice_candidates(&self, user_id: &UserId, extension: &Extension) {
        let Some(candidates) = extension.get(KEY_ICE_CANDIDATES).and_then(Value::as_array) else {
            warn!(session_id = %self.id, "ICE candidates event from {} without candidates", user_id);
            return;
        };
        self.activity
            .lock()
            .ice_candidates
            .entry(user_id.clone())
            .or_default()
            .extend(candidates.iter().cloned());
    }

    fn process_on_update(&self, user_id: &UserId, extension: &Extension) {
        self.activity
            .lock()
            .last_update
            .insert(user_id.clone(), extension.clone());
    }
}

/// Factory for [`SignalingSession`]s
///
/// With an answer timeout configured, every outgoing session gets a timer task
/// that reports unanswered opponents through `on_user_not_answer` once the
/// timeout elapses. The timer needs a running tokio runtime and is skipped
/// without one.
#[derive(Debug, Clone, Default)]
pub struct SignalingSessionFactory {
    answer_timeout: Option<Duration>,
}

impl SignalingSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer_timeout(mut self, timeout: Duration) -> Self {
        self.answer_timeout = Some(timeout);
        self
    }
}

async fn answer_timer(session: Weak<SignalingSession>, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    if let Some(session) = session.upgrade() {
        let unanswered = session.check_unanswered();
        if !unanswered.is_empty() {
            info!(session_id = %session.id, "{} opponent(s) did not answer", unanswered.len());
        }
    }
}

impl SessionFactory for SignalingSessionFactory {
    fn create_session(&self, params: SessionParams) -> SessionRef {
        let session = Arc::new(SignalingSession::new(params));
        if let Some(timeout) = self.answer_timeout {
            if session.is_initiator() {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(answer_timer(Arc::downgrade(&session), timeout));
                    }
                    Err(_) => {
                        debug!(session_id = %session.id, "No runtime, answer timer not started");
                    }
                }
            }
        }
        session
    }
}
