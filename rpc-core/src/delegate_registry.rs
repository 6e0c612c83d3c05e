//! Delegate proxy registry (§4.5): client-side local-handler bookkeeping and
//! server-side forging of proxies that route back to the client.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::CoreError;

/// A client-registered callable: invoked when the server sends an `invoke`
/// message targeting its `handler_key`.
pub type LocalHandler = Arc<dyn Fn(Vec<serde_json::Value>) + Send + Sync>;

/// Opaque identity of whatever object owns a set of registered handlers
/// (typically a generated proxy instance). Used only for bulk teardown.
pub type OwnerId = u64;

struct Entry {
    handler: LocalHandler,
    owner: OwnerId,
}

/// Client-side registry mapping `handler_key` (a UUID handed to the server
/// at registration time) to the local callable it identifies.
#[derive(Clone, Default)]
pub struct ClientDelegateRegistry {
    entries: Arc<DashMap<Uuid, Entry>>,
}

impl ClientDelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`, returning the key to hand to the server.
    pub fn register(&self, owning_proxy: OwnerId, handler: LocalHandler) -> Uuid {
        let handler_key = Uuid::new_v4();
        self.entries.insert(handler_key, Entry { handler, owner: owning_proxy });
        handler_key
    }

    /// Look up a handler by key, without removing it.
    pub fn lookup(&self, handler_key: Uuid) -> Option<LocalHandler> {
        self.entries.get(&handler_key).map(|e| e.handler.clone())
    }

    /// Invoke the handler for `handler_key` with `arguments`. A missing
    /// handler is not an error here — callers log and continue per §4.5.
    pub fn invoke(&self, handler_key: Uuid, arguments: Vec<serde_json::Value>) -> bool {
        match self.lookup(handler_key) {
            Some(handler) => {
                handler(arguments);
                true
            }
            None => false,
        }
    }

    /// Drop every handler owned by `owning_proxy`, called when that proxy is
    /// disposed.
    pub fn unregister_all_of(&self, owning_proxy: OwnerId) {
        self.entries.retain(|_, entry| entry.owner != owning_proxy);
    }
}

/// Callback a forged delegate routes its arguments into, server-side. The
/// server does not await a reply — delegates are one-way.
pub type InvokeCallback = Arc<dyn Fn(Vec<serde_json::Value>) + Send + Sync>;

/// A forged server-side stand-in for a client-registered delegate.
///
/// Calling it runs `on_invoke` with the supplied arguments; callers that
/// need the declared delegate type's zero-valued return can ignore the
/// `()`  this produces.
#[derive(Clone)]
pub struct ProxiedDelegate {
    on_invoke: InvokeCallback,
}

impl ProxiedDelegate {
    pub fn invoke(&self, arguments: Vec<serde_json::Value>) {
        (self.on_invoke)(arguments)
    }
}

/// Server-side factory forging proxies for remote delegates, caching them
/// per `handler_key` so repeated forging of the same handler returns an
/// identical proxy identity (needed for `-=`-style symmetric removal).
#[derive(Clone, Default)]
pub struct DelegateProxyFactory {
    cache: Arc<DashMap<Uuid, ProxiedDelegate>>,
}

impl DelegateProxyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forge (or return the cached) proxy for `handler_key`.
    ///
    /// `target_delegate_is_void` must be `true`: only void-returning
    /// delegate types are supported, since the server never awaits a reply.
    pub fn forge(
        &self,
        handler_key: Uuid,
        target_delegate_is_void: bool,
        on_invoke: InvokeCallback,
    ) -> Result<ProxiedDelegate, CoreError> {
        if !target_delegate_is_void {
            return Err(CoreError::UnsupportedDelegateType(
                "only void delegates are supported for remote invocation".into(),
            ));
        }

        if let Some(existing) = self.cache.get(&handler_key) {
            return Ok(existing.clone());
        }

        let proxy = ProxiedDelegate { on_invoke };
        self.cache.insert(handler_key, proxy.clone());
        Ok(proxy)
    }

    /// Drop the cached proxy for `handler_key`, if any.
    pub fn forget(&self, handler_key: Uuid) {
        self.cache.remove(&handler_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn client_registry_round_trip() {
        let registry = ClientDelegateRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let key = registry.register(1, Arc::new(move |_args| { calls_clone.fetch_add(1, Ordering::SeqCst); }));
        assert!(registry.invoke(key, vec![]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_handler_is_not_an_error() {
        let registry = ClientDelegateRegistry::new();
        assert!(!registry.invoke(Uuid::new_v4(), vec![]));
    }

    #[test]
    fn unregister_all_of_removes_only_owned_handlers() {
        let registry = ClientDelegateRegistry::new();
        let k1 = registry.register(1, Arc::new(|_| {}));
        let k2 = registry.register(2, Arc::new(|_| {}));

        registry.unregister_all_of(1);
        assert!(registry.lookup(k1).is_none());
        assert!(registry.lookup(k2).is_some());
    }

    #[test]
    fn forging_the_same_handler_key_twice_returns_identical_identity() {
        let factory = DelegateProxyFactory::new();
        let key = Uuid::new_v4();
        let a = factory.forge(key, true, Arc::new(|_| {})).unwrap();
        let b = factory.forge(key, true, Arc::new(|_| {})).unwrap();
        assert!(Arc::ptr_eq(&a.on_invoke, &b.on_invoke));
    }

    #[test]
    fn forging_a_non_void_delegate_fails() {
        let factory = DelegateProxyFactory::new();
        let err = factory.forge(Uuid::new_v4(), false, Arc::new(|_| {})).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedDelegateType(_)));
    }
}
