//! Server event hooks (§4.9): `before_call`, `after_call`, `begin_call`,
//! `reject_call`, `logon`, `logoff`, `error`.
//!
//! `begin_call` can veto a dispatch, so it is realized as a synchronous
//! mutation hook rather than a fire-and-forget broadcast — handlers run
//! in registration order against a `&mut BeginCallEvent` they can flip
//! `cancel` on. The rest are observational, realized with
//! `tokio::sync::broadcast` (the same pattern used elsewhere in the pack
//! for session lifecycle events).

use parking_lot::RwLock;
use relay_rpc_wire::RemoteExceptionMessage;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Context available to `begin_call` handlers, with the veto flag they may set.
pub struct BeginCallEvent {
    pub session_id: Uuid,
    pub service_name: String,
    pub method_name: String,
    pub cancel: bool,
    pub exception: Option<RemoteExceptionMessage>,
}

/// Context available to `before_call`/`after_call`/`reject_call` observers.
#[derive(Clone, Debug)]
pub struct CallEvent {
    pub session_id: Uuid,
    pub service_name: String,
    pub method_name: String,
    pub failed: bool,
}

/// Broadcast lifecycle events for `logon`/`logoff`/`error`.
#[derive(Clone, Debug)]
pub enum ServerLifecycleEvent {
    Logon { session_id: Uuid, identity_name: String },
    Logoff { session_id: Uuid },
    Error { session_id: Option<Uuid>, message: String },
}

type BeginCallHook = Arc<dyn Fn(&mut BeginCallEvent) + Send + Sync>;
type CallHook = Arc<dyn Fn(&CallEvent) + Send + Sync>;

/// Owns every registered hook plus the lifecycle broadcast channel for one
/// [`crate::Server`] instance.
pub struct ServerEvents {
    begin_call: RwLock<Vec<BeginCallHook>>,
    before_call: RwLock<Vec<CallHook>>,
    after_call: RwLock<Vec<CallHook>>,
    reject_call: RwLock<Vec<CallHook>>,
    lifecycle: broadcast::Sender<ServerLifecycleEvent>,
}

impl Default for ServerEvents {
    fn default() -> Self {
        let (lifecycle, _) = broadcast::channel(256);
        Self {
            begin_call: RwLock::new(Vec::new()),
            before_call: RwLock::new(Vec::new()),
            after_call: RwLock::new(Vec::new()),
            reject_call: RwLock::new(Vec::new()),
            lifecycle,
        }
    }
}

impl ServerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_begin_call(&self, hook: BeginCallHook) {
        self.begin_call.write().push(hook);
    }

    pub fn on_before_call(&self, hook: CallHook) {
        self.before_call.write().push(hook);
    }

    pub fn on_after_call(&self, hook: CallHook) {
        self.after_call.write().push(hook);
    }

    pub fn on_reject_call(&self, hook: CallHook) {
        self.reject_call.write().push(hook);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerLifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// Run every registered `begin_call` hook in order; the first hook that
    /// sets `cancel` short-circuits the rest.
    pub fn fire_begin_call(&self, mut event: BeginCallEvent) -> BeginCallEvent {
        for hook in self.begin_call.read().iter() {
            hook(&mut event);
            if event.cancel {
                break;
            }
        }
        event
    }

    pub fn fire_before_call(&self, event: &CallEvent) {
        for hook in self.before_call.read().iter() {
            hook(event);
        }
    }

    pub fn fire_after_call(&self, event: &CallEvent) {
        for hook in self.after_call.read().iter() {
            hook(event);
        }
    }

    pub fn fire_reject_call(&self, event: &CallEvent) {
        for hook in self.reject_call.read().iter() {
            hook(event);
        }
    }

    pub fn fire_logon(&self, session_id: Uuid, identity_name: String) {
        let _ = self.lifecycle.send(ServerLifecycleEvent::Logon { session_id, identity_name });
    }

    pub fn fire_logoff(&self, session_id: Uuid) {
        let _ = self.lifecycle.send(ServerLifecycleEvent::Logoff { session_id });
    }

    pub fn fire_error(&self, session_id: Option<Uuid>, message: String) {
        let _ = self.lifecycle.send(ServerLifecycleEvent::Error { session_id, message });
    }
}
