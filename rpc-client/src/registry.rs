//! Process-wide registry of active [`crate::Client`] instances, plus an
//! optional weakly-held default instance (§4.9, §9 Open Questions).
//!
//! The default-instance reference is deliberately `Weak`, independent of the
//! strong map: a client that is the default does not get kept alive merely
//! by being default, and is explicitly cleared from both the map and the
//! default slot on disposal.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};

use crate::Client;

static ACTIVE: OnceLock<DashMap<String, Arc<Client>>> = OnceLock::new();
static DEFAULT: OnceLock<Mutex<Option<Weak<Client>>>> = OnceLock::new();

fn active() -> &'static DashMap<String, Arc<Client>> {
    ACTIVE.get_or_init(DashMap::new)
}

fn default_slot() -> &'static Mutex<Option<Weak<Client>>> {
    DEFAULT.get_or_init(|| Mutex::new(None))
}

/// Register `client` under its `unique_client_instance_name`, and as the
/// process default if `is_default` is set on its config.
pub fn register(client: &Arc<Client>) {
    active().insert(client.config().unique_client_instance_name.clone(), client.clone());
    if client.config().is_default {
        *default_slot().lock() = Some(Arc::downgrade(client));
    }
}

/// Look up an active client by instance name.
pub fn get(name: &str) -> Option<Arc<Client>> {
    active().get(name).map(|entry| entry.clone())
}

/// The current process default client, if one is registered and still alive.
pub fn default_client() -> Option<Arc<Client>> {
    default_slot().lock().as_ref().and_then(Weak::upgrade)
}

/// Remove `name` from the active map, and clear the default slot if it was
/// pointing at this instance.
pub fn unregister(name: &str) {
    active().remove(name);
    let mut slot = default_slot().lock();
    if let Some(weak) = slot.as_ref() {
        if weak.upgrade().map(|c| c.config().unique_client_instance_name == name).unwrap_or(true) {
            *slot = None;
        }
    }
}
