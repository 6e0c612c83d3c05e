//! Proxy dispatch glue (§4.10).
//!
//! A Rust reimplementation has no runtime reflection, so "a typed call
//! through a proxy of interface `I`" is a hand-written (or generated) struct
//! implementing the service's trait; each method builds the
//! `MethodCallMessage` described here and drives it through
//! [`crate::ClientEngine::invoke_remote_method`]. This module holds the
//! pieces that are common to every such call: delegate-argument mapping and
//! unwrapping the result.

use relay_rpc_wire::{CallContextEntry, MethodCallMessage, MethodCallParameterMessage, MethodCallResultMessage, RemoteDelegateInfo};
use serde_json::Value;

use crate::engine::ClientEngine;
use crate::ClientError;
use relay_rpc_core::{CallContext, LocalHandler, OwnerId};

/// One argument about to be sent as part of a [`MethodCallMessage`], before
/// delegate-argument mapping.
pub enum Argument {
    /// A plain, already-serializable value.
    Value { name: String, declared_type_name: String, value: Value },
    /// A local callable the server should be able to invoke in reverse.
    /// Only void-returning delegate types are supported (§4.10 preflight).
    Delegate { name: String, declared_type_name: String, handler: LocalHandler },
}

/// Build a `MethodCallMessage` from already-classified arguments, mapping
/// any [`Argument::Delegate`] into a `RemoteDelegateInfo` registered on
/// `engine`'s delegate registry first.
pub fn build_call(
    engine: &ClientEngine,
    owning_proxy: OwnerId,
    service_name: impl Into<String>,
    method_name: impl Into<String>,
    arguments: Vec<Argument>,
) -> MethodCallMessage {
    let mut parameters = Vec::with_capacity(arguments.len());

    for arg in arguments {
        let (name, declared_type_name, value) = match arg {
            Argument::Value { name, declared_type_name, value } => (name, declared_type_name, value),
            Argument::Delegate { name, declared_type_name, handler } => {
                let handler_key = engine.delegate_registry().register(owning_proxy, handler);
                let info = RemoteDelegateInfo { handler_key, delegate_type_name: declared_type_name.clone() };
                (name, declared_type_name, serde_json::to_value(info).expect("RemoteDelegateInfo always serializes"))
            }
        };

        let is_value_null = value.is_null();
        let bytes = serde_json::to_vec(&value).expect("serde_json::Value always serializes");
        parameters.push(MethodCallParameterMessage { name, declared_type_name, value: bytes, is_value_null });
    }

    MethodCallMessage {
        service_name: service_name.into(),
        method_name: method_name.into(),
        generic_argument_type_names: None,
        parameters,
        call_context_snapshot: Vec::new(),
    }
}

/// Dispatch `call` through `engine`, snapshotting the ambient call context
/// in and restoring it from the reply (§4.4, §4.10).
///
/// `declares_non_void_return` is the generated proxy's static knowledge of
/// the method's declared return type — `one_way` combined with a non-void
/// declared return is a caller bug (a one-way call can never deliver that
/// return value), rejected up front rather than silently dropped (§9
/// Preflight).
pub async fn dispatch(
    engine: &ClientEngine,
    mut call: MethodCallMessage,
    one_way: bool,
    declares_non_void_return: bool,
) -> Result<Option<Value>, ClientError> {
    if one_way && declares_non_void_return {
        return Err(ClientError::NotSupported("a one-way call cannot declare a non-void return type".into()));
    }

    if one_way {
        call.call_context_snapshot = current_snapshot();
        engine.invoke_remote_method(call, true).await?;
        return Ok(None);
    }

    call.call_context_snapshot = current_snapshot();
    let result: MethodCallResultMessage = engine
        .invoke_remote_method(call, false)
        .await?
        .expect("two-way invocation always yields a result on success");

    restore_snapshot(result.call_context_snapshot);

    if result.is_return_value_null {
        return Ok(None);
    }
    let value: Value = serde_json::from_slice(&result.return_value).map_err(|e| ClientError::Network(e.to_string()))?;
    Ok(Some(value))
}

/// Blocking adapter for synchronous call sites (§9 "Sync/async duality"):
/// blocks the calling thread on [`dispatch`]'s future using the Tokio
/// runtime handle already driving `engine`. The invocation timeout
/// configured on the client still applies inside `dispatch`; this only
/// adds the blocking wait on top of it.
///
/// Must be called from a thread that is not itself a worker thread driving
/// that runtime's async tasks (same restriction as
/// [`tokio::runtime::Handle::block_on`]) — e.g. a plain OS thread, or a
/// `spawn_blocking` task.
pub fn dispatch_blocking(
    engine: &ClientEngine,
    call: MethodCallMessage,
    one_way: bool,
    declares_non_void_return: bool,
) -> Result<Option<Value>, ClientError> {
    tokio::runtime::Handle::current().block_on(dispatch(engine, call, one_way, declares_non_void_return))
}

fn current_snapshot() -> Vec<CallContextEntry> {
    CallContext::snapshot_current()
}

fn restore_snapshot(entries: Vec<CallContextEntry>) {
    CallContext::restore_into_current(entries);
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_rpc_core::ClientDelegateRegistry;
    use std::sync::Arc;

    fn test_engine() -> ClientEngine {
        ClientEngine::new_for_test()
    }

    #[test]
    fn plain_value_arguments_pass_through() {
        let engine = test_engine();
        let call = build_call(
            &engine,
            1,
            "IEcho",
            "Echo",
            vec![Argument::Value { name: "text".into(), declared_type_name: "string".into(), value: Value::String("hi".into()) }],
        );
        assert_eq!(call.service_name, "IEcho");
        assert_eq!(call.parameters.len(), 1);
        assert!(!call.parameters[0].is_value_null);
    }

    #[tokio::test]
    async fn one_way_call_declaring_a_non_void_return_is_rejected_before_dispatch() {
        let engine = test_engine();
        let call = build_call(&engine, 1, "IEcho", "Echo", vec![]);

        let err = dispatch(&engine, call, true, true).await.unwrap_err();
        assert!(matches!(err, ClientError::NotSupported(_)));
    }

    #[test]
    fn delegate_arguments_register_and_become_remote_delegate_info() {
        let engine = test_engine();
        let handler: LocalHandler = Arc::new(|_args| {});
        let call = build_call(
            &engine,
            1,
            "INotifier",
            "Subscribe",
            vec![Argument::Delegate { name: "onEvent".into(), declared_type_name: "Action<string>".into(), handler }],
        );

        let param = &call.parameters[0];
        let value: Value = serde_json::from_slice(&param.value).unwrap();
        assert!(value.get("handler_key").is_some());
        assert_eq!(value.get("delegate_type_name").unwrap(), "Action<string>");
    }
}
