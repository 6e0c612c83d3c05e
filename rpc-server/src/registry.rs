//! Process-wide registry of active [`crate::Server`] instances, plus an
//! optional weakly-held default instance (§4.9, §9 Open Questions) — the
//! server-side mirror of the client registry.
//!
//! The default-instance reference is deliberately `Weak`, independent of the
//! strong map: a server that is the default does not get kept alive merely
//! by being default, and is explicitly cleared from both the map and the
//! default slot on disposal.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};

use crate::Server;

static ACTIVE: OnceLock<DashMap<String, Arc<Server>>> = OnceLock::new();
static DEFAULT: OnceLock<Mutex<Option<Weak<Server>>>> = OnceLock::new();

fn active() -> &'static DashMap<String, Arc<Server>> {
    ACTIVE.get_or_init(DashMap::new)
}

fn default_slot() -> &'static Mutex<Option<Weak<Server>>> {
    DEFAULT.get_or_init(|| Mutex::new(None))
}

/// Register `server` under its `unique_server_instance_name`, and as the
/// process default if `is_default` is set on its config.
pub fn register(server: &Arc<Server>) {
    active().insert(server.config().unique_server_instance_name.clone(), server.clone());
    if server.config().is_default {
        *default_slot().lock() = Some(Arc::downgrade(server));
    }
}

/// Look up an active server by instance name.
pub fn get(name: &str) -> Option<Arc<Server>> {
    active().get(name).map(|entry| entry.clone())
}

/// The current process default server, if one is registered and still alive.
pub fn default_server() -> Option<Arc<Server>> {
    default_slot().lock().as_ref().and_then(Weak::upgrade)
}

/// Remove `name` from the active map, and clear the default slot if it was
/// pointing at this instance.
pub fn unregister(name: &str) {
    active().remove(name);
    let mut slot = default_slot().lock();
    if let Some(weak) = slot.as_ref() {
        if weak.upgrade().map(|s| s.config().unique_server_instance_name == name).unwrap_or(true) {
            *slot = None;
        }
    }
}
