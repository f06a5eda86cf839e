//! Application callbacks fired by the event router
//!
//! Applications observe calls through five optional slots held in
//! [`CallHandlers`]. Each slot receives the session the event belongs to and a
//! payload: the sanitized projection for call/accept/reject/stop and the raw
//! payload for update.
//!
//! Callbacks return `anyhow::Result<()>`. An error or a panic inside a callback
//! is logged and swallowed so that one misbehaving listener cannot stop the
//! event from reaching its session or break later dispatches.
//!
//! ```rust
//! use rtcall_client_core::events::CallHandlers;
//!
//! let handlers = CallHandlers::new()
//!     .with_on_call(|session, extension| {
//!         println!("incoming call {} ({} extra keys)", session.id(), extension.len());
//!         Ok(())
//!     })
//!     .with_on_stop_call(|session, _| {
//!         println!("call {} stopped", session.id());
//!         Ok(())
//!     });
//!
//! assert!(handlers.on_call.is_some());
//! assert!(handlers.on_accept_call.is_none());
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::call::SessionId;
use crate::extension::Extension;
use crate::session::SessionRef;

/// Callback invoked with a session and an event payload
pub type CallCallback = Arc<dyn Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync>;

/// Optional application callbacks, one slot per router-fired event
#[derive(Clone, Default)]
pub struct CallHandlers {
    /// First "call" event for a session id (sanitized payload)
    pub on_call: Option<CallCallback>,
    /// Remote accept (sanitized payload)
    pub on_accept_call: Option<CallCallback>,
    /// Remote reject (sanitized payload)
    pub on_reject_call: Option<CallCallback>,
    /// Remote stop (sanitized payload)
    pub on_stop_call: Option<CallCallback>,
    /// Remote update (raw payload)
    pub on_update_call: Option<CallCallback>,
}

impl fmt::Debug for CallHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandlers")
            .field("on_call", &self.on_call.is_some())
            .field("on_accept_call", &self.on_accept_call.is_some())
            .field("on_reject_call", &self.on_reject_call.is_some())
            .field("on_stop_call", &self.on_stop_call.is_some())
            .field("on_update_call", &self.on_update_call.is_some())
            .finish()
    }
}

impl CallHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_call = Some(Arc::new(f));
        self
    }

    pub fn with_on_accept_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_accept_call = Some(Arc::new(f));
        self
    }

    pub fn with_on_reject_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_reject_call = Some(Arc::new(f));
        self
    }

    pub fn with_on_stop_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_stop_call = Some(Arc::new(f));
        self
    }

    pub fn with_on_update_call<F>(mut self, f: F) -> Self
    where
        F: Fn(&SessionRef, &Extension) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_update_call = Some(Arc::new(f));
        self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run a listener, reporting its failure instead of propagating it
///
/// Returns `true` when the listener completed successfully.
pub(crate) fn invoke_isolated<F>(hook: &'static str, session_id: &SessionId, f: F) -> bool
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(hook = hook, session_id = %session_id, "Listener failed: {:#}", e);
            false
        }
        Err(payload) => {
            error!(
                hook = hook,
                session_id = %session_id,
                "Listener panicked: {}",
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_empty_handlers() {
        let handlers = CallHandlers::new();
        assert!(handlers.on_call.is_none());
        assert!(handlers.on_update_call.is_none());
        assert_eq!(
            format!("{:?}", handlers),
            "CallHandlers { on_call: false, on_accept_call: false, on_reject_call: false, on_stop_call: false, on_update_call: false }"
        );
    }

    #[test]
    #[traced_test]
    fn test_invoke_isolated_reports_errors() {
        let id = SessionId::from("s-1");
        assert!(invoke_isolated("onCall", &id, || Ok(())));
        assert!(!invoke_isolated("onCall", &id, || Err(anyhow::anyhow!("listener broke"))));
        assert!(logs_contain("listener broke"));
    }

    #[test]
    #[traced_test]
    fn test_invoke_isolated_catches_panics() {
        let id = SessionId::from("s-2");
        let ok = invoke_isolated("onStopCall", &id, || panic!("boom in listener"));
        assert!(!ok);
        assert!(logs_contain("boom in listener"));
    }
}
