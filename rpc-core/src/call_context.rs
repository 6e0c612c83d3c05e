//! Flow-local call context (§4.4).
//!
//! Each dispatched call gets its own key/value map that survives `.await`
//! suspension points within that call but is invisible to concurrently
//! dispatched calls on the same session. `tokio::task_local!` gives us
//! exactly that: a value scoped to the async task tree spawned for one
//! call, restored whenever that task resumes, never shared across tasks.

use parking_lot::RwLock;
use relay_rpc_wire::CallContextEntry;
use std::collections::HashMap;
use std::sync::Arc;

tokio::task_local! {
    static CURRENT: Arc<RwLock<HashMap<String, serde_json::Value>>>;
}

/// A snapshot-able, mutable bag of values scoped to one in-flight call.
#[derive(Clone, Default)]
pub struct CallContext {
    inner: Arc<RwLock<HashMap<String, serde_json::Value>>>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a context from a snapshot received over the wire.
    pub fn from_snapshot(entries: Vec<CallContextEntry>) -> Self {
        let map = entries.into_iter().map(|e| (e.name, e.value)).collect();
        Self { inner: Arc::new(RwLock::new(map)) }
    }

    /// Serialize the current contents for inclusion in an outgoing message.
    pub fn snapshot(&self) -> Vec<CallContextEntry> {
        self.inner
            .read()
            .iter()
            .map(|(name, value)| CallContextEntry { name: name.clone(), value: value.clone() })
            .collect()
    }

    /// Run `future` with this context installed as the ambient one for the
    /// duration of the call, including across every `.await` inside it.
    pub async fn scope<F: std::future::Future>(&self, future: F) -> F::Output {
        CURRENT.scope(self.inner.clone(), future).await
    }

    /// Get a value set on the ambient context of the currently executing call.
    ///
    /// Returns `None` both when the key is absent and when called outside
    /// any [`CallContext::scope`].
    pub fn get(name: &str) -> Option<serde_json::Value> {
        CURRENT.try_with(|map| map.read().get(name).cloned()).ok().flatten()
    }

    /// Set a value on the ambient context of the currently executing call.
    /// A no-op outside any [`CallContext::scope`].
    pub fn set(name: impl Into<String>, value: serde_json::Value) {
        let _ = CURRENT.try_with(|map| {
            map.write().insert(name.into(), value);
        });
    }

    /// Snapshot the ambient context of the currently executing call, for
    /// inclusion in an outgoing message. Empty outside any
    /// [`CallContext::scope`], matching `restore(null)` clearing semantics.
    pub fn snapshot_current() -> Vec<CallContextEntry> {
        CURRENT
            .try_with(|map| {
                map.read()
                    .iter()
                    .map(|(name, value)| CallContextEntry { name: name.clone(), value: value.clone() })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the ambient context of the currently executing call with
    /// `entries`, clearing whatever was there before. A no-op outside any
    /// [`CallContext::scope`].
    pub fn restore_into_current(entries: Vec<CallContextEntry>) {
        let _ = CURRENT.try_with(|map| {
            let mut map = map.write();
            map.clear();
            map.extend(entries.into_iter().map(|e| (e.name, e.value)));
        });
    }
}
