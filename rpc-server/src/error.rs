//! Server-facing error type (§7), tagged with the same six kinds as the
//! client side so callers can match on kind.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Network(String),

    #[error("security error: {0}")]
    Security(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("remote invocation failed: {message}")]
    RemoteInvocation {
        message: String,
        #[source]
        inner: Option<Box<ServerError>>,
    },

    #[error("not supported: {0}")]
    NotSupported(String),

    /// A correlation or registry lookup failed — e.g. `SessionRepository::get`
    /// on an unknown session id.
    #[error("key not found: {0}")]
    KeyNotFound(Uuid),
}

impl From<relay_rpc_core::CoreError> for ServerError {
    fn from(err: relay_rpc_core::CoreError) -> Self {
        use relay_rpc_core::CoreError as E;
        match err {
            E::Crypto(e) => Self::Security(e.to_string()),
            E::Wire(e) => Self::Network(e.to_string()),
            E::Codec(msg) => Self::Network(msg),
            E::MalformedMessage(msg) => Self::Network(msg),
            E::Network(msg) => Self::Network(msg),
            E::UnsupportedDelegateType(msg) => Self::NotSupported(msg),
        }
    }
}

impl From<relay_rpc_wire::WireError> for ServerError {
    fn from(err: relay_rpc_wire::WireError) -> Self {
        Self::Network(err.to_string())
    }
}
