//! The client session engine (§4.6): connect/handshake/auth/keep-alive,
//! the in-flight call table, and inbound dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use relay_rpc_core::{
    create_wire_message, decrypt_handshake_message, decrypt_payload, CallContext, ClientDelegateRegistry,
    MessageChannel, SharedSecret,
};
use relay_rpc_crypto::KeyPair;
use relay_rpc_wire::{
    AuthenticationRequestMessage, AuthenticationResponseMessage, GoodbyeMessage, Identity, MessageType,
    MethodCallMessage, MethodCallResultMessage, RemoteDelegateInvocationMessage, RemoteExceptionMessage, WireMessage,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{ClientConfig, ClientError};

/// The outcome of one in-flight RPC, delivered to the awaiting caller.
pub enum RpcOutcome {
    Success(MethodCallResultMessage),
    Error(RemoteExceptionMessage),
}

/// Lifecycle state of a [`ClientEngine`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Handshaking,
    Authenticating,
    Ready,
    Closing,
    Errored,
}

/// Bookkeeping for one call dispatched through [`ClientEngine::invoke_remote_method`].
struct InFlightCall {
    completion: oneshot::Sender<RpcOutcome>,
}

/// Drives one client-side session: connect, authenticate, dispatch RPCs,
/// route inbound delegate invocations, and disconnect.
pub struct ClientEngine {
    config: ClientConfig,
    key_pair: KeyPair,
    channel: Arc<dyn MessageChannel>,
    state: RwLock<ClientState>,
    session_id: RwLock<Option<Uuid>>,
    shared_secret: RwLock<Option<SharedSecret>>,
    server_public_key_blob: RwLock<Vec<u8>>,
    identity: RwLock<Option<Identity>>,
    in_flight: DashMap<String, InFlightCall>,
    delegate_registry: ClientDelegateRegistry,
    handshake_signal: RwLock<Option<oneshot::Sender<Result<(), ClientError>>>>,
    auth_signal: RwLock<Option<oneshot::Sender<Result<(), ClientError>>>>,
    goodbye_signal: RwLock<Option<oneshot::Sender<()>>>,
    keep_alive_running: AtomicBool,
}

#[cfg(test)]
impl ClientEngine {
    /// A bare, unconnected engine for unit-testing pieces (like proxy
    /// dispatch glue) that only need the delegate registry, not a live
    /// session.
    pub(crate) fn new_for_test() -> Self {
        Self {
            config: ClientConfig::default(),
            key_pair: KeyPair::generate(relay_rpc_crypto::rsa::MIN_KEY_SIZE_BITS).unwrap(),
            channel: Arc::new(relay_rpc_core::loopback::pair(None).0),
            state: RwLock::new(ClientState::Disconnected),
            session_id: RwLock::new(None),
            shared_secret: RwLock::new(None),
            server_public_key_blob: RwLock::new(Vec::new()),
            identity: RwLock::new(None),
            in_flight: DashMap::new(),
            delegate_registry: ClientDelegateRegistry::new(),
            handshake_signal: RwLock::new(None),
            auth_signal: RwLock::new(None),
            goodbye_signal: RwLock::new(None),
            keep_alive_running: AtomicBool::new(false),
        }
    }
}

impl ClientEngine {
    /// Construct an engine over an already-opened channel and drive the
    /// connect protocol (§4.6) to completion: handshake, then auth if
    /// credentials are configured.
    #[instrument(skip(config, channel), fields(client = %config.unique_client_instance_name))]
    pub async fn connect(config: ClientConfig, channel: Arc<dyn MessageChannel>) -> Result<Arc<Self>, ClientError> {
        let key_pair = KeyPair::generate(config.key_size_bits).map_err(|e| ClientError::Security(e.to_string()))?;

        let engine = Arc::new(Self {
            config: config.clone(),
            key_pair,
            channel: channel.clone(),
            state: RwLock::new(ClientState::Connecting),
            session_id: RwLock::new(None),
            shared_secret: RwLock::new(None),
            server_public_key_blob: RwLock::new(Vec::new()),
            identity: RwLock::new(None),
            in_flight: DashMap::new(),
            delegate_registry: ClientDelegateRegistry::new(),
            handshake_signal: RwLock::new(None),
            auth_signal: RwLock::new(None),
            goodbye_signal: RwLock::new(None),
            keep_alive_running: AtomicBool::new(false),
        });

        let (handshake_tx, handshake_rx) = oneshot::channel();
        *engine.handshake_signal.write() = Some(handshake_tx);

        let reader_engine = engine.clone();
        let reader_handle = tokio::spawn(async move { reader_engine.read_loop().await });

        // Step 2: empty frame triggers session creation on the server.
        if let Err(e) = channel.send(Vec::new()).await.map_err(|e| ClientError::Network(e.to_string())) {
            return Err(engine.fail_connect(reader_handle, e).await);
        }

        *engine.state.write() = ClientState::Handshaking;
        let deadline = config.connection_timeout_sec;
        let handshake_outcome =
            await_with_timeout(handshake_rx, deadline, ClientError::Network("handshake timed out".into()))
                .await
                .and_then(std::convert::identity);
        if let Err(e) = handshake_outcome {
            return Err(engine.fail_connect(reader_handle, e).await);
        }

        if !config.credentials.is_empty() {
            if let Err(e) = engine.authenticate().await {
                return Err(engine.fail_connect(reader_handle, e).await);
            }
        }

        *engine.state.write() = ClientState::Ready;
        info!("session established");

        if config.keep_session_alive_interval_sec > 0 {
            engine.clone().spawn_keep_alive();
        }

        Ok(engine)
    }

    /// A connect attempt failed handshake or authentication: the session is
    /// terminal on error (§4.6). Close the channel, stop the reader task
    /// spawned for this attempt, mark the engine `Errored`, and pass the
    /// triggering error through unchanged.
    async fn fail_connect(&self, reader_handle: JoinHandle<()>, err: ClientError) -> ClientError {
        *self.state.write() = ClientState::Errored;
        let _ = self.channel.close().await;
        reader_handle.abort();
        error!(error = %err, "connect failed, session terminated");
        err
    }

    async fn authenticate(&self) -> Result<(), ClientError> {
        *self.state.write() = ClientState::Authenticating;
        let (auth_tx, auth_rx) = oneshot::channel();
        *self.auth_signal.write() = Some(auth_tx);

        let request = AuthenticationRequestMessage { credentials: self.config.credentials.clone() };
        let payload = serde_json::to_vec(&request).map_err(|e| ClientError::Network(e.to_string()))?;
        self.send_payload(MessageType::Auth, payload, String::new(), false).await?;

        await_with_timeout(
            auth_rx,
            self.config.authentication_timeout_sec,
            ClientError::Security("authentication timed out".into()),
        )
        .await??;
        Ok(())
    }

    fn spawn_keep_alive(self: Arc<Self>) {
        self.keep_alive_running.store(true, Ordering::SeqCst);
        let interval = Duration::from_secs(self.config.keep_session_alive_interval_sec);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !self.keep_alive_running.load(Ordering::SeqCst) {
                    break;
                }
                if self.channel.send(Vec::new()).await.is_err() {
                    break;
                }
            }
        });
    }

    fn shared_secret(&self) -> Option<SharedSecret> {
        *self.shared_secret.read()
    }

    async fn send_payload(
        &self,
        message_type: MessageType,
        payload: Vec<u8>,
        unique_call_key: String,
        error: bool,
    ) -> Result<(), ClientError> {
        let message =
            create_wire_message(message_type, payload, &self.key_pair, self.shared_secret(), unique_call_key, error)?;
        let bytes = serde_json::to_vec(&message).map_err(|e| ClientError::Network(e.to_string()))?;
        self.channel.send(bytes).await.map_err(|e| ClientError::Network(e.to_string()))
    }

    /// Dispatch one RPC (§4.6 "Dispatching calls"). `one_way` calls do not
    /// wait for a reply.
    pub async fn invoke_remote_method(
        &self,
        call: MethodCallMessage,
        one_way: bool,
    ) -> Result<Option<MethodCallResultMessage>, ClientError> {
        let unique_call_key = Uuid::new_v4().to_string();
        let payload = serde_json::to_vec(&call).map_err(|e| ClientError::Network(e.to_string()))?;

        if one_way {
            self.send_payload(MessageType::Rpc, payload, unique_call_key, false).await?;
            return Ok(None);
        }

        let (tx, rx) = oneshot::channel();
        self.in_flight.insert(unique_call_key.clone(), InFlightCall { completion: tx });
        self.send_payload(MessageType::Rpc, payload, unique_call_key.clone(), false).await?;

        let outcome = await_with_timeout(
            rx,
            self.config.invocation_timeout_sec,
            ClientError::Timeout(format!("invocation {unique_call_key} timed out")),
        )
        .await?;

        match outcome {
            RpcOutcome::Success(result) => Ok(Some(result)),
            RpcOutcome::Error(exception) => Err(ClientError::RemoteInvocation {
                message: exception.message,
                inner: exception.inner.map(|inner| Box::new(ClientError::RemoteInvocation { message: inner.message, inner: None })),
            }),
        }
    }

    /// The client-side delegate registry, shared with proxy dispatch glue.
    pub fn delegate_registry(&self) -> &ClientDelegateRegistry {
        &self.delegate_registry
    }

    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        *self.session_id.read()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    /// Graceful disconnect (§4.6 "Disconnect"). Idempotent.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        if *self.state.read() == ClientState::Disconnected {
            return Ok(());
        }
        *self.state.write() = ClientState::Closing;
        self.keep_alive_running.store(false, Ordering::SeqCst);

        if let Some(session_id) = self.session_id() {
            let (tx, rx) = oneshot::channel();
            *self.goodbye_signal.write() = Some(tx);

            let goodbye = GoodbyeMessage { session_id };
            if let Ok(payload) = serde_json::to_vec(&goodbye) {
                let _ = self.send_payload(MessageType::Goodbye, payload, String::new(), false).await;
            }

            let _ = tokio::time::timeout(
                Duration::from_millis(self.config.wait_time_for_goodbye_on_disconnect_ms),
                rx,
            )
            .await;
        }

        let _ = self.channel.close().await;
        // Every future must be resolved before disposal returns (§4.6): drop
        // any completion senders left over from calls still in flight so
        // their callers observe a closed session instead of hanging.
        self.fail_all_in_flight();
        *self.state.write() = ClientState::Disconnected;
        info!("session closed");
        Ok(())
    }

    #[instrument(skip(self), fields(client = %self.config.unique_client_instance_name))]
    async fn read_loop(self: Arc<Self>) {
        loop {
            match self.channel.recv().await {
                Ok(Some(frame)) => {
                    if frame.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.handle_frame(frame).await {
                        warn!(error = %e, "error handling inbound frame");
                    }
                }
                Ok(None) => {
                    debug!("channel closed by peer");
                    self.fail_all_in_flight();
                    break;
                }
                Err(e) => {
                    error!(error = %e, "transport error reading frame");
                    self.fail_all_in_flight();
                    break;
                }
            }
        }
    }

    /// Drop every pending completion sender so in-flight callers observe a
    /// "session closed" failure rather than waiting out their full timeout.
    fn fail_all_in_flight(&self) {
        self.in_flight.clear();
    }

    #[instrument(skip(self, frame), fields(client = %self.config.unique_client_instance_name))]
    async fn handle_frame(&self, frame: Vec<u8>) -> Result<(), ClientError> {
        let wire_message: WireMessage = serde_json::from_slice(&frame).map_err(|e| ClientError::Network(e.to_string()))?;
        let message_type = wire_message.parsed_type()?;

        match message_type {
            MessageType::CompleteHandshake => self.handle_handshake(&wire_message)?,
            MessageType::AuthResponse => self.handle_auth_response(&wire_message)?,
            MessageType::RpcResult => self.handle_rpc_result(&wire_message)?,
            MessageType::Invoke => self.handle_invoke(&wire_message)?,
            MessageType::Goodbye => {
                if let Some(signal) = self.goodbye_signal.write().take() {
                    let _ = signal.send(());
                }
            }
            other => warn!(?other, "unexpected message type on client"),
        }
        Ok(())
    }

    fn handle_handshake(&self, wire_message: &WireMessage) -> Result<(), ClientError> {
        let session_id = if self.config.message_encryption {
            let (plain, server_blob) = decrypt_handshake_message(wire_message, &self.key_pair)?;
            *self.server_public_key_blob.write() = server_blob;
            Uuid::from_slice(&plain).map_err(|e| ClientError::Network(e.to_string()))?
        } else {
            Uuid::from_slice(&wire_message.data).map_err(|e| ClientError::Network(e.to_string()))?
        };

        *self.session_id.write() = Some(session_id);
        *self.shared_secret.write() = Some(SharedSecret(session_id));

        if let Some(signal) = self.handshake_signal.write().take() {
            let _ = signal.send(Ok(()));
        }
        Ok(())
    }

    fn handle_auth_response(&self, wire_message: &WireMessage) -> Result<(), ClientError> {
        let payload = decrypt_payload(wire_message, self.shared_secret(), &self.server_public_key_blob.read())?;
        let response: AuthenticationResponseMessage =
            serde_json::from_slice(&payload).map_err(|e| ClientError::Network(e.to_string()))?;

        *self.identity.write() = response.identity.clone();

        let outcome = if response.is_authenticated {
            Ok(())
        } else {
            Err(ClientError::Security("server rejected credentials".into()))
        };
        if let Some(signal) = self.auth_signal.write().take() {
            let _ = signal.send(outcome);
        }
        Ok(())
    }

    fn handle_rpc_result(&self, wire_message: &WireMessage) -> Result<(), ClientError> {
        let Some((_, call)) = self.in_flight.remove(&wire_message.unique_call_key) else {
            warn!(call_key = %wire_message.unique_call_key, "late or unknown rpc_result");
            return Ok(());
        };

        let payload = decrypt_payload(wire_message, self.shared_secret(), &self.server_public_key_blob.read())?;

        let outcome = if wire_message.error {
            let exception: RemoteExceptionMessage =
                serde_json::from_slice(&payload).map_err(|e| ClientError::Network(e.to_string()))?;
            RpcOutcome::Error(exception)
        } else {
            let result: MethodCallResultMessage =
                serde_json::from_slice(&payload).map_err(|e| ClientError::Network(e.to_string()))?;
            RpcOutcome::Success(result)
        };

        let _ = call.completion.send(outcome);
        Ok(())
    }

    fn handle_invoke(&self, wire_message: &WireMessage) -> Result<(), ClientError> {
        let payload = decrypt_payload(wire_message, self.shared_secret(), &self.server_public_key_blob.read())?;
        let invocation: RemoteDelegateInvocationMessage =
            serde_json::from_slice(&payload).map_err(|e| ClientError::Network(e.to_string()))?;

        if !self.delegate_registry.invoke(invocation.handler_key, invocation.delegate_arguments) {
            warn!(handler_key = %invocation.handler_key, "no local delegate registered for handler_key");
        }
        Ok(())
    }
}

/// Runs `CallContext::scope` around the full in-flight lifetime of one call
/// so values set before the call are visible to server-side dispatch after
/// round-tripping through the snapshot, and vice versa on the way back.
pub async fn with_call_context<F: std::future::Future>(ctx: &CallContext, fut: F) -> F::Output {
    ctx.scope(fut).await
}

async fn await_with_timeout<T>(
    rx: oneshot::Receiver<T>,
    timeout_sec: u64,
    on_timeout: ClientError,
) -> Result<T, ClientError> {
    let recv_err = |_| ClientError::Network("signal sender dropped before completion".into());

    if timeout_sec == 0 {
        return rx.await.map_err(recv_err);
    }
    match tokio::time::timeout(Duration::from_secs(timeout_sec), rx).await {
        Ok(result) => result.map_err(recv_err),
        Err(_) => Err(on_timeout),
    }
}
