//! Service dispatch (§9 redesign note): the Rust-idiomatic stand-in for
//! reflective method resolution. Each service implements [`ServiceDispatcher`]
//! once; the registry looks services up by name and hands dispatch off to
//! them by method name.

use async_trait::async_trait;
use dashmap::DashMap;
use relay_rpc_wire::RemoteExceptionMessage;
use std::sync::Arc;

/// One resolved argument value, already decoded by the active serializer.
pub type ArgValue = serde_json::Value;

/// A service exposed to remote callers. One implementation per
/// `service_name`; `dispatch` resolves `method_name` internally (the
/// Rust-idiomatic analogue of "a single generic dispatcher keyed by method
/// identity" from the source system).
#[async_trait]
pub trait ServiceDispatcher: Send + Sync {
    /// Invoke `method_name` with `args`, returning the serialized return
    /// value or a wire-portable exception.
    ///
    /// `Ok(None)` signals a void return. Method-not-found is reported via
    /// `Err` with a message naming the missing method — dispatch callers
    /// treat any `Err` uniformly as a remote exception.
    async fn dispatch(&self, method_name: &str, args: Vec<ArgValue>) -> Result<Option<ArgValue>, RemoteExceptionMessage>;

    /// Whether `method_name` is declared one-way (§4.7.1 step 8): the
    /// server does not send a reply and the client does not await one.
    /// Plain data instead of reflection, per §9.
    fn is_one_way(&self, method_name: &str) -> bool {
        let _ = method_name;
        false
    }
}

/// Process-local registry of services by name — the Rust stand-in for the
/// source system's dependency-injection container (§6 `dependency_injection_container`).
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<DashMap<String, Arc<dyn ServiceDispatcher>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service_name: impl Into<String>, service: Arc<dyn ServiceDispatcher>) {
        self.services.insert(service_name.into(), service);
    }

    pub fn get(&self, service_name: &str) -> Option<Arc<dyn ServiceDispatcher>> {
        self.services.get(service_name).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ServiceDispatcher for Echo {
        async fn dispatch(&self, method_name: &str, args: Vec<ArgValue>) -> Result<Option<ArgValue>, RemoteExceptionMessage> {
            match method_name {
                "Echo" => Ok(args.into_iter().next()),
                other => Err(RemoteExceptionMessage::new(format!("method not found: {other}"))),
            }
        }
    }

    #[tokio::test]
    async fn registered_service_is_found_and_dispatches() {
        let registry = ServiceRegistry::new();
        registry.register("IEcho", Arc::new(Echo));

        let service = registry.get("IEcho").unwrap();
        let result = service.dispatch("Echo", vec![serde_json::json!("hi")]).await.unwrap();
        assert_eq!(result, Some(serde_json::json!("hi")));
    }

    #[tokio::test]
    async fn unknown_method_is_a_remote_exception() {
        let registry = ServiceRegistry::new();
        registry.register("IEcho", Arc::new(Echo));
        let service = registry.get("IEcho").unwrap();
        let err = service.dispatch("Nope", vec![]).await.unwrap_err();
        assert!(err.message.contains("Nope"));
    }

    #[test]
    fn unknown_service_is_absent() {
        let registry = ServiceRegistry::new();
        assert!(registry.get("IMissing").is_none());
    }
}
