//! Public server facade (§4.9): the type embedding applications construct,
//! register services against, and start.

use std::sync::Arc;

use relay_rpc_core::{loopback, MessageChannel};

use crate::session::{ServerContext, ServerSession};
use crate::{AuthenticationProvider, ServerConfig, ServerConfigError, ServerError, ServerEvents, ServiceDispatcher, ServiceRegistry};
use crate::session_repository::SessionRepository;

/// The server-side facade: owns the service registry, session repository,
/// and event hooks for one listening instance.
pub struct Server {
    ctx: Arc<ServerContext>,
    repository: Arc<SessionRepository>,
}

impl Server {
    /// Validate `config` and construct a server with no accepted sessions
    /// yet. `auth_provider` is consulted on every `auth` message even when
    /// `config.authentication_required` is false (§4.7 step for "auth"),
    /// since a client may still choose to authenticate.
    pub fn new(config: ServerConfig, auth_provider: Arc<dyn AuthenticationProvider>) -> Result<Arc<Self>, ServerConfigError> {
        config.validate()?;
        let ctx = Arc::new(ServerContext {
            services: ServiceRegistry::new(),
            events: Arc::new(ServerEvents::new()),
            auth_provider,
            config,
        });
        let repository = SessionRepository::new();
        repository.spawn_idle_sweeper(
            ctx.config.inactive_session_sweep_interval_sec,
            ctx.config.maximum_session_inactivity_time_minutes,
        );

        let server = Arc::new(Self { ctx, repository });
        crate::registry::register(&server);
        Ok(server)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    pub fn events(&self) -> &Arc<ServerEvents> {
        &self.ctx.events
    }

    /// Register a service under `service_name`, available to callers once
    /// this returns (§6 `dependency_injection_container`).
    pub fn register_service(&self, service_name: impl Into<String>, service: Arc<dyn ServiceDispatcher>) {
        self.ctx.services.register(service_name, service);
    }

    /// Accept an already-open channel as a new session (§4.7 Creation). The
    /// transport adapter (a real listener, or the loopback helper below) is
    /// responsible for producing `channel` and reading any out-of-band
    /// `client_public_key_blob` via [`relay_rpc_core::ConnectMetadata`].
    pub async fn accept(self: &Arc<Self>, channel: Arc<dyn MessageChannel>) -> Result<Arc<ServerSession>, ServerError> {
        let metadata = channel.connect_metadata();
        let session =
            ServerSession::create(self.ctx.clone(), channel, metadata.peer_public_key_blob, Arc::downgrade(&self.repository)).await?;
        self.repository.insert(session.clone());
        Ok(session)
    }

    /// Convenience wiring an in-process loopback pair and accepting the
    /// server end immediately, intended for tests and the bundled demo.
    /// Returns the client-side channel end.
    pub async fn accept_loopback(self: &Arc<Self>, client_public_key_blob: Option<Vec<u8>>) -> Result<Arc<dyn MessageChannel>, ServerError> {
        let (client_end, server_end) = loopback::pair(client_public_key_blob);
        let server_end: Arc<dyn MessageChannel> = Arc::new(server_end);
        let client_end: Arc<dyn MessageChannel> = Arc::new(client_end);
        self.accept(server_end).await?;
        Ok(client_end)
    }

    pub fn session_count(&self) -> usize {
        self.repository.len()
    }

    pub fn get_session(&self, session_id: uuid::Uuid) -> Result<Arc<ServerSession>, ServerError> {
        self.repository.get(session_id)
    }

    /// Stop accepting new work and drop every live session (§4.8 disposal).
    pub fn stop(&self) {
        self.repository.dispose();
        crate::registry::unregister(&self.ctx.config.unique_server_instance_name);
    }
}
