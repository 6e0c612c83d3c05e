//! One server-side session (§4.7): the per-connection state bundle and its
//! inbound dispatch loop, including RPC dispatch (§4.7.1).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use relay_rpc_core::{
    create_handshake_message, create_wire_message, decrypt_payload, CallContext, DelegateProxyFactory, MessageChannel,
    SharedSecret,
};
use relay_rpc_crypto::KeyPair;
use relay_rpc_wire::{
    AuthenticationRequestMessage, AuthenticationResponseMessage, GoodbyeMessage, Identity, MessageType,
    MethodCallMessage, MethodCallOutParameterMessage, MethodCallParameterMessage, MethodCallResultMessage,
    RemoteDelegateInvocationMessage, RemoteExceptionMessage, WireMessage,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::events::{BeginCallEvent, CallEvent};
use crate::{AuthenticationProvider, ServerConfig, ServerError, ServerEvents, ServiceRegistry};

/// Context shared by every session belonging to one [`crate::Server`].
pub struct ServerContext {
    pub services: ServiceRegistry,
    pub events: Arc<ServerEvents>,
    pub auth_provider: Arc<dyn AuthenticationProvider>,
    pub config: ServerConfig,
}

/// Per-connection session state, created when the transport adapter reports
/// a new peer's zero-byte frame (§4.7 Creation).
pub struct ServerSession {
    pub session_id: Uuid,
    key_pair: KeyPair,
    client_public_key_blob: Option<Vec<u8>>,
    is_authenticated: AtomicBool,
    identity: parking_lot::RwLock<Option<Identity>>,
    last_activity_unix: AtomicI64,
    channel: Arc<dyn MessageChannel>,
    delegate_proxy_factory: DelegateProxyFactory,
    ctx: Arc<ServerContext>,
    repository: Weak<crate::SessionRepository>,
}

impl ServerSession {
    /// Create a session for a newly connected peer and send `complete_handshake`.
    #[instrument(skip(ctx, channel, repository))]
    pub async fn create(
        ctx: Arc<ServerContext>,
        channel: Arc<dyn MessageChannel>,
        client_public_key_blob: Option<Vec<u8>>,
        repository: Weak<crate::SessionRepository>,
    ) -> Result<Arc<Self>, ServerError> {
        let key_pair = KeyPair::generate(ctx.config.key_size_bits).map_err(|e| ServerError::Security(e.to_string()))?;
        let session_id = Uuid::new_v4();

        let session = Arc::new(Self {
            session_id,
            key_pair,
            client_public_key_blob: client_public_key_blob.clone(),
            is_authenticated: AtomicBool::new(false),
            identity: parking_lot::RwLock::new(None),
            last_activity_unix: AtomicI64::new(now_unix()),
            channel: channel.clone(),
            delegate_proxy_factory: DelegateProxyFactory::new(),
            ctx,
            repository,
        });

        let handshake = if session.ctx.config.message_encryption {
            let client_public = client_public_key_blob
                .as_deref()
                .ok_or_else(|| ServerError::Security("encryption on but no client public key supplied".into()))?;
            let client_public = relay_rpc_crypto::PublicKey::from_blob(client_public).map_err(ServerError::from_crypto)?;
            create_handshake_message(session_id.as_bytes(), &session.key_pair, &client_public)?
        } else {
            WireMessage::new(MessageType::CompleteHandshake, session_id.as_bytes().to_vec())
        };

        let bytes = serde_json::to_vec(&handshake).map_err(|e| ServerError::Network(e.to_string()))?;
        channel.send(bytes).await.map_err(|e| ServerError::Network(e.to_string()))?;

        info!(session_id = %session_id, "session established");

        let reader = session.clone();
        tokio::spawn(async move { reader.read_loop().await });

        Ok(session)
    }

    fn shared_secret(&self) -> Option<SharedSecret> {
        self.ctx.config.message_encryption.then_some(SharedSecret(self.session_id))
    }

    fn touch(&self) {
        self.last_activity_unix.store(now_unix(), Ordering::SeqCst);
    }

    pub fn last_activity_unix(&self) -> i64 {
        self.last_activity_unix.load(Ordering::SeqCst)
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated.load(Ordering::SeqCst)
    }

    async fn send_payload(&self, message_type: MessageType, payload: Vec<u8>, unique_call_key: String, error: bool) -> Result<(), ServerError> {
        let message = create_wire_message(message_type, payload, &self.key_pair, self.shared_secret(), unique_call_key, error)?;
        let bytes = serde_json::to_vec(&message).map_err(|e| ServerError::Network(e.to_string()))?;
        self.channel.send(bytes).await.map_err(|e| ServerError::Network(e.to_string()))
    }

    /// Send an `invoke` message to the client for a forged delegate
    /// callback. One-way: the server does not await a reply.
    pub async fn send_invoke(&self, invocation: RemoteDelegateInvocationMessage) -> Result<(), ServerError> {
        let payload = serde_json::to_vec(&invocation).map_err(|e| ServerError::Network(e.to_string()))?;
        self.send_payload(MessageType::Invoke, payload, invocation.unique_call_key, false).await
    }

    #[instrument(skip(self), fields(session_id = %self.session_id))]
    async fn read_loop(self: Arc<Self>) {
        loop {
            match self.channel.recv().await {
                Ok(Some(frame)) => {
                    self.touch();
                    if frame.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.handle_frame(&frame).await {
                        error!(error = %e, "error handling inbound frame");
                        self.ctx.events.fire_error(Some(self.session_id), e.to_string());
                    }
                }
                Ok(None) => {
                    debug!("channel closed by peer");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "transport error reading frame");
                    self.ctx.events.fire_error(Some(self.session_id), e.to_string());
                    break;
                }
            }
        }
        if let Some(repository) = self.repository.upgrade() {
            repository.remove(self.session_id);
        }
    }

    async fn handle_frame(self: &Arc<Self>, frame: &[u8]) -> Result<(), ServerError> {
        let wire_message: WireMessage = serde_json::from_slice(frame).map_err(|e| ServerError::Network(e.to_string()))?;
        match wire_message.parsed_type()? {
            MessageType::Auth => self.handle_auth(&wire_message).await,
            MessageType::Rpc => self.handle_rpc(&wire_message).await,
            MessageType::Goodbye => self.handle_goodbye(&wire_message).await,
            other => {
                warn!(?other, "unexpected message type on server");
                Ok(())
            }
        }
    }

    async fn handle_auth(&self, wire_message: &WireMessage) -> Result<(), ServerError> {
        if self.is_authenticated() {
            return Ok(());
        }

        let payload = decrypt_payload(wire_message, self.shared_secret(), self.client_public_key_blob())?;
        let request: AuthenticationRequestMessage =
            serde_json::from_slice(&payload).map_err(|e| ServerError::Network(e.to_string()))?;

        let response = match self.ctx.auth_provider.authenticate(&request).await {
            Ok(identity) => {
                self.is_authenticated.store(true, Ordering::SeqCst);
                *self.identity.write() = Some(identity.clone());
                self.ctx.events.fire_logon(self.session_id, identity.name.clone());
                AuthenticationResponseMessage { is_authenticated: true, identity: Some(identity) }
            }
            Err(message) => {
                self.ctx.events.fire_error(Some(self.session_id), message);
                AuthenticationResponseMessage { is_authenticated: false, identity: None }
            }
        };

        let payload = serde_json::to_vec(&response).map_err(|e| ServerError::Network(e.to_string()))?;
        self.send_payload(MessageType::AuthResponse, payload, wire_message.unique_call_key.clone(), false).await
    }

    async fn handle_goodbye(&self, wire_message: &WireMessage) -> Result<(), ServerError> {
        let payload = decrypt_payload(wire_message, self.shared_secret(), self.client_public_key_blob())?;
        let goodbye: GoodbyeMessage = serde_json::from_slice(&payload).map_err(|e| ServerError::Network(e.to_string()))?;

        if goodbye.session_id != self.session_id {
            warn!("goodbye session_id mismatch, ignoring");
            return Ok(());
        }

        self.send_payload(MessageType::Goodbye, Vec::new(), String::new(), false).await?;
        if let Some(repository) = self.repository.upgrade() {
            repository.remove(self.session_id);
        }
        if self.is_authenticated() {
            self.ctx.events.fire_logoff(self.session_id);
        }
        Ok(())
    }

    /// §4.7.1 RPC dispatch.
    async fn handle_rpc(self: &Arc<Self>, wire_message: &WireMessage) -> Result<(), ServerError> {
        let payload = decrypt_payload(wire_message, self.shared_secret(), self.client_public_key_blob())?;
        let call: MethodCallMessage = serde_json::from_slice(&payload).map_err(|e| ServerError::Network(e.to_string()))?;
        let unique_call_key = wire_message.unique_call_key.clone();

        let begin = self.ctx.events.fire_begin_call(BeginCallEvent {
            session_id: self.session_id,
            service_name: call.service_name.clone(),
            method_name: call.method_name.clone(),
            cancel: false,
            exception: None,
        });

        if begin.cancel {
            let exception = begin.exception.unwrap_or_else(|| RemoteExceptionMessage::new("call rejected by begin_call handler"));
            self.ctx.events.fire_reject_call(&CallEvent {
                session_id: self.session_id,
                service_name: call.service_name.clone(),
                method_name: call.method_name.clone(),
                failed: true,
            });
            return self.reply_exception(unique_call_key, exception).await;
        }

        if self.ctx.config.authentication_required && !self.is_authenticated() {
            return self
                .reply_exception(unique_call_key, RemoteExceptionMessage::new("session is not authenticated"))
                .await;
        }

        CallContext::from_snapshot(call.call_context_snapshot.clone()).scope(self.dispatch_call(call, unique_call_key)).await
    }

    async fn dispatch_call(self: &Arc<Self>, call: MethodCallMessage, unique_call_key: String) -> Result<(), ServerError> {
        let Some(service) = self.ctx.services.get(&call.service_name) else {
            return self
                .reply_exception(unique_call_key, RemoteExceptionMessage::new(format!("service not found: {}", call.service_name)))
                .await;
        };

        let one_way = service.is_one_way(&call.method_name);
        let args = self.unwrap_parameters(&call.parameters).await?;

        let before_event = CallEvent {
            session_id: self.session_id,
            service_name: call.service_name.clone(),
            method_name: call.method_name.clone(),
            failed: false,
        };
        self.ctx.events.fire_before_call(&before_event);

        let outcome = service.dispatch(&call.method_name, args).await;

        let after_event = CallEvent { failed: outcome.is_err(), ..before_event };
        self.ctx.events.fire_after_call(&after_event);

        if one_way {
            return Ok(());
        }

        match outcome {
            Ok(return_value) => {
                let return_value = return_value.unwrap_or(serde_json::Value::Null);
                let is_return_value_null = return_value.is_null();
                let return_value = serde_json::to_vec(&return_value).map_err(|e| ServerError::Network(e.to_string()))?;
                let result = MethodCallResultMessage {
                    return_value,
                    is_return_value_null,
                    out_parameters: Vec::<MethodCallOutParameterMessage>::new(),
                    call_context_snapshot: CallContext::snapshot_current(),
                };
                let payload = serde_json::to_vec(&result).map_err(|e| ServerError::Network(e.to_string()))?;
                self.send_payload(MessageType::RpcResult, payload, unique_call_key, false).await
            }
            Err(exception) => self.reply_exception(unique_call_key, exception).await,
        }
    }

    async fn reply_exception(&self, unique_call_key: String, exception: RemoteExceptionMessage) -> Result<(), ServerError> {
        let payload = serde_json::to_vec(&exception).map_err(|e| ServerError::Network(e.to_string()))?;
        self.send_payload(MessageType::RpcResult, payload, unique_call_key, true).await
    }

    fn client_public_key_blob(&self) -> &[u8] {
        self.client_public_key_blob.as_deref().unwrap_or(&[])
    }

    /// The delegate-proxy cache for this session (§4.5), exposed so an
    /// embedding service can forge or invoke client-registered callbacks
    /// directly when the generic dispatch path below isn't enough.
    pub fn delegate_proxy_factory(&self) -> &DelegateProxyFactory {
        &self.delegate_proxy_factory
    }

    /// Decode each parameter's bytes back into a `serde_json::Value` (the
    /// inverse of the serializer-envelope convention — §4.3), forging a
    /// session-cached delegate proxy for any argument shaped like a
    /// `RemoteDelegateInfo` (§4.7.1 step 7). The forged proxy, when called,
    /// sends an `invoke` message back to the client; services that need to
    /// actually call it look it up via [`ServerSession::delegate_proxy_factory`]
    /// using the `handler_key` carried in the (otherwise opaque) argument value.
    async fn unwrap_parameters(
        self: &Arc<Self>,
        parameters: &[MethodCallParameterMessage],
    ) -> Result<Vec<serde_json::Value>, ServerError> {
        let mut args = Vec::with_capacity(parameters.len());
        for p in parameters {
            if p.is_value_null {
                args.push(serde_json::Value::Null);
                continue;
            }
            let value: serde_json::Value =
                serde_json::from_slice(&p.value).map_err(|e| ServerError::Network(e.to_string()))?;

            if let Ok(info) = serde_json::from_value::<relay_rpc_wire::RemoteDelegateInfo>(value.clone()) {
                let session = self.clone();
                self.delegate_proxy_factory.forge(
                    info.handler_key,
                    true,
                    Arc::new(move |delegate_arguments| {
                        let session = session.clone();
                        let invocation = RemoteDelegateInvocationMessage {
                            handler_key: info.handler_key,
                            delegate_arguments,
                            unique_call_key: Uuid::new_v4().to_string(),
                        };
                        tokio::spawn(async move {
                            if let Err(e) = session.send_invoke(invocation).await {
                                warn!(error = %e, "failed to send invoke message for forged delegate");
                            }
                        });
                    }),
                )?;
            }

            args.push(value);
        }
        Ok(args)
    }
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

impl ServerError {
    fn from_crypto(e: relay_rpc_crypto::CryptoError) -> Self {
        Self::Security(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_repository::SessionRepository;
    use crate::{ArgValue, AllowAllAuthenticationProvider, ServerConfig, ServerEvents, ServiceDispatcher, ServiceRegistry};
    use async_trait::async_trait;
    use relay_rpc_core::loopback;
    use relay_rpc_wire::{MethodCallMessage, MethodCallParameterMessage, MethodCallResultMessage};

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

    fn test_context(config: ServerConfig) -> Arc<ServerContext> {
        let services = ServiceRegistry::new();
        services.register("IEcho", Arc::new(Echo));
        Arc::new(ServerContext { services, events: Arc::new(ServerEvents::new()), auth_provider: Arc::new(AllowAllAuthenticationProvider), config })
    }

    fn rpc_envelope(call: &MethodCallMessage, unique_call_key: &str) -> WireMessage {
        let payload = serde_json::to_vec(call).unwrap();
        let fake_kp = KeyPair::generate(1024).unwrap();
        create_wire_message(MessageType::Rpc, payload, &fake_kp, None, unique_call_key, false).unwrap()
    }

    #[tokio::test]
    async fn create_sends_cleartext_handshake_when_encryption_disabled() {
        let ctx = test_context(ServerConfig { message_encryption: false, ..Default::default() });
        let (client_end, server_end) = loopback::pair(None);
        let repository = SessionRepository::new();

        let session = ServerSession::create(ctx, Arc::new(server_end), None, Arc::downgrade(&repository)).await.unwrap();

        let frame = client_end.recv().await.unwrap().unwrap();
        let handshake: WireMessage = serde_json::from_slice(&frame).unwrap();
        assert_eq!(handshake.parsed_type().unwrap(), MessageType::CompleteHandshake);
        assert_eq!(handshake.data, session.session_id.as_bytes().to_vec());
    }

    #[tokio::test]
    async fn rpc_call_dispatches_and_replies() {
        let ctx = test_context(ServerConfig { message_encryption: false, ..Default::default() });
        let (client_end, server_end) = loopback::pair(None);
        let repository = SessionRepository::new();

        ServerSession::create(ctx, Arc::new(server_end), None, Arc::downgrade(&repository)).await.unwrap();
        client_end.recv().await.unwrap().unwrap(); // handshake

        let call = MethodCallMessage {
            service_name: "IEcho".into(),
            method_name: "Echo".into(),
            generic_argument_type_names: None,
            parameters: vec![MethodCallParameterMessage {
                name: "text".into(),
                declared_type_name: "string".into(),
                value: serde_json::to_vec(&serde_json::json!("hi")).unwrap(),
                is_value_null: false,
            }],
            call_context_snapshot: Vec::new(),
        };
        let envelope = rpc_envelope(&call, "call-1");
        client_end.send(serde_json::to_vec(&envelope).unwrap()).await.unwrap();

        let reply_frame = client_end.recv().await.unwrap().unwrap();
        let reply: WireMessage = serde_json::from_slice(&reply_frame).unwrap();
        assert!(!reply.error);
        assert_eq!(reply.unique_call_key, "call-1");
        let result: MethodCallResultMessage = serde_json::from_slice(&reply.data).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&result.return_value).unwrap();
        assert_eq!(value, serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn unknown_service_comes_back_as_an_error_reply() {
        let ctx = test_context(ServerConfig { message_encryption: false, ..Default::default() });
        let (client_end, server_end) = loopback::pair(None);
        let repository = SessionRepository::new();

        ServerSession::create(ctx, Arc::new(server_end), None, Arc::downgrade(&repository)).await.unwrap();
        client_end.recv().await.unwrap().unwrap(); // handshake

        let call = MethodCallMessage {
            service_name: "IMissing".into(),
            method_name: "Whatever".into(),
            generic_argument_type_names: None,
            parameters: vec![],
            call_context_snapshot: Vec::new(),
        };
        let envelope = rpc_envelope(&call, "call-2");
        client_end.send(serde_json::to_vec(&envelope).unwrap()).await.unwrap();

        let reply_frame = client_end.recv().await.unwrap().unwrap();
        let reply: WireMessage = serde_json::from_slice(&reply_frame).unwrap();
        assert!(reply.error);
        let exception: RemoteExceptionMessage = serde_json::from_slice(&reply.data).unwrap();
        assert!(exception.message.contains("IMissing"));
    }

    #[tokio::test]
    async fn unauthenticated_call_is_rejected_when_auth_required() {
        let ctx = test_context(ServerConfig { message_encryption: false, authentication_required: true, ..Default::default() });
        let (client_end, server_end) = loopback::pair(None);
        let repository = SessionRepository::new();

        ServerSession::create(ctx, Arc::new(server_end), None, Arc::downgrade(&repository)).await.unwrap();
        client_end.recv().await.unwrap().unwrap(); // handshake

        let call = MethodCallMessage {
            service_name: "IEcho".into(),
            method_name: "Echo".into(),
            generic_argument_type_names: None,
            parameters: vec![],
            call_context_snapshot: Vec::new(),
        };
        let envelope = rpc_envelope(&call, "call-3");
        client_end.send(serde_json::to_vec(&envelope).unwrap()).await.unwrap();

        let reply_frame = client_end.recv().await.unwrap().unwrap();
        let reply: WireMessage = serde_json::from_slice(&reply_frame).unwrap();
        assert!(reply.error);
    }

    #[tokio::test]
    async fn goodbye_removes_the_session_from_the_repository() {
        let ctx = test_context(ServerConfig { message_encryption: false, ..Default::default() });
        let (client_end, server_end) = loopback::pair(None);
        let repository = SessionRepository::new();

        let session = ServerSession::create(ctx, Arc::new(server_end), None, Arc::downgrade(&repository)).await.unwrap();
        repository.insert(session.clone());
        client_end.recv().await.unwrap().unwrap(); // handshake

        let goodbye = GoodbyeMessage { session_id: session.session_id };
        let payload = serde_json::to_vec(&goodbye).unwrap();
        let fake_kp = KeyPair::generate(1024).unwrap();
        let envelope = create_wire_message(MessageType::Goodbye, payload, &fake_kp, None, String::new(), false).unwrap();
        client_end.send(serde_json::to_vec(&envelope).unwrap()).await.unwrap();

        client_end.recv().await.unwrap().unwrap(); // goodbye ack

        for _ in 0..50 {
            if repository.get(session.session_id).is_err() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(repository.get(session.session_id).is_err());
    }
}
