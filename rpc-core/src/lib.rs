//! Protocol engine shared by the relay-rpc client and server: the envelope
//! encryption manager, call context, delegate proxy registry, and the raw
//! transport contract they run over.

pub mod call_context;
pub mod crypto_session;
pub mod delegate_registry;
pub mod transport;

pub use call_context::CallContext;
pub use crypto_session::{
    create_handshake_message, create_wire_message, decrypt_handshake_message, decrypt_payload, SharedSecret,
};
pub use delegate_registry::{ClientDelegateRegistry, DelegateProxyFactory, InvokeCallback, LocalHandler, OwnerId, ProxiedDelegate};
pub use transport::{loopback, ConnectMetadata, MessageChannel};

/// Errors from the shared session engine plumbing.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A cryptographic operation failed — signature mismatch, decrypt
    /// failure, or similar. Callers surface this as a `SecurityError`.
    #[error(transparent)]
    Crypto(#[from] relay_rpc_crypto::CryptoError),

    /// A wire-level encode/decode failed.
    #[error(transparent)]
    Wire(#[from] relay_rpc_wire::WireError),

    /// JSON (de)serialization of an envelope-internal structure failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// A received message did not have the shape this stage expects.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The transport could not send or receive a frame.
    #[error("network error: {0}")]
    Network(String),

    /// A delegate mapping was attempted for a non-void delegate type.
    #[error("unsupported delegate type: {0}")]
    UnsupportedDelegateType(String),
}
