//! Payload types carried inside a [`crate::WireMessage`] once decrypted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry of a [`crate::CallContext`] snapshot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CallContextEntry {
    pub name: String,
    pub value: serde_json::Value,
}

/// A single RPC parameter, carried either directly or, when the serializer
/// requires it for polymorphic fidelity, wrapped in a type envelope by the
/// caller before `value` is filled in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodCallParameterMessage {
    pub name: String,
    pub declared_type_name: String,
    pub value: Vec<u8>,
    pub is_value_null: bool,
}

/// An out/ref parameter written back by the server after invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodCallOutParameterMessage {
    pub name: String,
    pub value: Vec<u8>,
    pub is_value_null: bool,
}

/// `rpc` payload: identifies the target method and carries its arguments
/// plus the caller's call-context snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodCallMessage {
    pub service_name: String,
    pub method_name: String,
    #[serde(default)]
    pub generic_argument_type_names: Option<Vec<String>>,
    pub parameters: Vec<MethodCallParameterMessage>,
    #[serde(default)]
    pub call_context_snapshot: Vec<CallContextEntry>,
}

/// `rpc_result` payload for the success case.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodCallResultMessage {
    pub return_value: Vec<u8>,
    pub is_return_value_null: bool,
    #[serde(default)]
    pub out_parameters: Vec<MethodCallOutParameterMessage>,
    #[serde(default)]
    pub call_context_snapshot: Vec<CallContextEntry>,
}

/// A wire-portable exception. Constructed on the server from whatever the
/// invoked method raised, reconstructed and re-raised client-side as a
/// `RemoteInvocationError` (§7).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RemoteExceptionMessage {
    pub message: String,
    #[serde(default)]
    pub inner: Option<Box<RemoteExceptionMessage>>,
}

impl RemoteExceptionMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), inner: None }
    }

    pub fn with_inner(mut self, inner: RemoteExceptionMessage) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }
}

/// Identifies a delegate the client has registered so the server can invoke
/// it in reverse, carried as an argument of a `MethodCallMessage`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RemoteDelegateInfo {
    pub handler_key: Uuid,
    pub delegate_type_name: String,
}

/// `invoke` payload: the server asking the client to run a registered
/// delegate. One-way — the server does not await a reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteDelegateInvocationMessage {
    pub handler_key: Uuid,
    pub delegate_arguments: Vec<serde_json::Value>,
    pub unique_call_key: String,
}

/// A single credential name/value pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub value: String,
}

/// `auth` payload.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AuthenticationRequestMessage {
    pub credentials: Vec<Credential>,
}

impl AuthenticationRequestMessage {
    /// Look up a credential by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.credentials.iter().find(|c| c.name == name).map(|c| c.value.as_str())
    }
}

/// The identity established by a successful authentication.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    pub name: String,
    pub auth_type: String,
    pub domain: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// `auth_response` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticationResponseMessage {
    pub is_authenticated: bool,
    pub identity: Option<Identity>,
}

/// `goodbye` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoodbyeMessage {
    pub session_id: Uuid,
}
