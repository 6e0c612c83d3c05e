//! Server-side session engine, service dispatch, and public facade for
//! relay-rpc.

mod auth;
mod config;
mod error;
mod events;
mod facade;
mod registry;
mod service_registry;
mod session;
mod session_repository;

pub use auth::{AllowAllAuthenticationProvider, AuthenticationProvider};
pub use config::{ServerConfig, ServerConfigError};
pub use error::ServerError;
pub use events::{BeginCallEvent, CallEvent, ServerEvents, ServerLifecycleEvent};
pub use facade::Server;
pub use service_registry::{ArgValue, ServiceDispatcher, ServiceRegistry};
pub use session::{ServerContext, ServerSession};
pub use session_repository::SessionRepository;

pub use registry::{default_server, get as get_server, unregister as unregister_server};
