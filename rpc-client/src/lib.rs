//! Client session engine, proxy dispatch glue, and public facade for
//! relay-rpc.

mod config;
mod engine;
mod error;
mod facade;
mod proxy;
mod registry;

pub use config::{ClientConfig, ClientConfigError};
pub use engine::{ClientEngine, ClientState, RpcOutcome};
pub use error::ClientError;
pub use facade::{Client, ClientEvent};
pub use proxy::{build_call, dispatch, dispatch_blocking, Argument};

pub use registry::{default_client, get as get_client, unregister as unregister_client};
