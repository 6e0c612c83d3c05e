//! Public client facade (§4.9): the type embedding applications construct
//! and hold on to.

use std::sync::Arc;

use relay_rpc_core::{loopback, ClientDelegateRegistry, MessageChannel};
use relay_rpc_wire::Identity;
use tokio::sync::broadcast;

use crate::{ClientConfig, ClientConfigError, ClientEngine, ClientError, ClientState};

/// Lifecycle events a [`Client`] emits. Mirrors the server facade's event
/// surface on the client side (§4.9's `logon`/`logoff`/`error`; `before_call`/
/// `after_call`/`begin_call`/`reject_call` are server-only per §4.7.1).
#[derive(Clone, Debug)]
pub enum ClientEvent {
    Logon(Identity),
    Logoff,
    Error(String),
}

/// The client-side facade: owns the session engine, exposes `connect`,
/// `disconnect`, proxy construction, and an event stream.
pub struct Client {
    config: ClientConfig,
    engine: tokio::sync::OnceCell<Arc<ClientEngine>>,
    events: broadcast::Sender<ClientEvent>,
}

impl Client {
    /// Validate `config` and construct an unconnected client.
    pub fn new(config: ClientConfig) -> Result<Arc<Self>, ClientConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(64);
        let client = Arc::new(Self { config, engine: tokio::sync::OnceCell::new(), events });
        crate::registry::register(&client);
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Subscribe to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Open a channel and drive the connect protocol to completion.
    pub async fn connect(&self, channel: Arc<dyn MessageChannel>) -> Result<(), ClientError> {
        let engine = ClientEngine::connect(self.config.clone(), channel).await?;
        if let Some(identity) = engine.identity() {
            let _ = self.events.send(ClientEvent::Logon(identity));
        }
        self.engine
            .set(engine)
            .map_err(|_| ClientError::Network("client is already connected".into()))?;
        Ok(())
    }

    /// Convenience constructor wiring an in-process loopback channel,
    /// intended for tests and the bundled demo (§6 Transport).
    pub async fn connect_loopback(&self, client_public_key_blob: Option<Vec<u8>>) -> Result<Arc<dyn MessageChannel>, ClientError> {
        let (client_end, server_end) = loopback::pair(client_public_key_blob);
        let server_end: Arc<dyn MessageChannel> = Arc::new(server_end);
        let client_end: Arc<dyn MessageChannel> = Arc::new(client_end);
        self.connect(client_end).await?;
        Ok(server_end)
    }

    pub fn is_connected(&self) -> bool {
        self.engine.get().map(|e| e.state() == ClientState::Ready).unwrap_or(false)
    }

    pub fn has_session(&self) -> bool {
        self.engine.get().map(|e| e.session_id().is_some()).unwrap_or(false)
    }

    /// The underlying session engine, used by generated proxies. Returns
    /// `NotSupported` if the client has not connected yet.
    pub fn engine(&self) -> Result<&Arc<ClientEngine>, ClientError> {
        self.engine.get().ok_or_else(|| ClientError::NotSupported("client is not connected".into()))
    }

    /// The delegate registry backing this client's proxies.
    pub fn delegate_registry(&self) -> Result<&ClientDelegateRegistry, ClientError> {
        Ok(self.engine()?.delegate_registry())
    }

    pub async fn disconnect(self: &Arc<Self>) -> Result<(), ClientError> {
        if let Some(engine) = self.engine.get() {
            engine.disconnect().await?;
            let _ = self.events.send(ClientEvent::Logoff);
        }
        crate::registry::unregister(&self.config.unique_client_instance_name);
        Ok(())
    }
}
