//! Client-facing error type (§7). Variants are tagged with the six error
//! kinds the protocol distinguishes so callers can match on kind rather than
//! string-sniffing a message.

use uuid::Uuid;

/// Errors surfaced by the client session engine and its public facade.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure, handshake timeout, or protocol framing violation.
    #[error("network error: {0}")]
    Network(String),

    /// Authentication failure, authentication timeout, or crypto failure.
    #[error("security error: {0}")]
    Security(String),

    /// Invocation, send, or goodbye-wait timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The invoked method raised on the server.
    #[error("remote invocation failed: {message}")]
    RemoteInvocation {
        message: String,
        #[source]
        inner: Option<Box<ClientError>>,
    },

    /// Static misuse of the API: one-way call declared with a non-void
    /// return type, or a non-void delegate passed as an argument.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A correlation or registry lookup failed. Internal-only; if it ever
    /// escapes to a caller it is surfaced as `Network`.
    #[error("key not found: {0}")]
    KeyNotFound(Uuid),
}

impl From<relay_rpc_core::CoreError> for ClientError {
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

impl From<relay_rpc_wire::WireError> for ClientError {
    fn from(err: relay_rpc_wire::WireError) -> Self {
        Self::Network(err.to_string())
    }
}
