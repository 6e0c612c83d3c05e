//! The outer `WireMessage` envelope and its signed/encrypted inner shapes.

use serde::{Deserialize, Serialize};

use crate::MessageType;

/// The outer envelope carried by the transport for every message.
///
/// `data` may be cleartext (encryption disabled) or the serialized form of
/// a [`SignedMessageData`] (encryption enabled) — see §4.2.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireMessage {
    /// Case-insensitive type tag selecting how to interpret `data`.
    pub message_type: String,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
    /// Correlation token for `rpc`/`rpc_result`/`invoke` messages; empty otherwise.
    #[serde(default)]
    pub unique_call_key: String,
    /// Initialization vector, present only when `data` is symmetrically encrypted.
    #[serde(default)]
    pub iv: Vec<u8>,
    /// Set on `rpc_result` to indicate `data` decodes to a remote exception
    /// rather than a `MethodCallResultMessage`.
    #[serde(default)]
    pub error: bool,
}

impl WireMessage {
    /// Construct a cleartext envelope (no `unique_call_key`, no `iv`).
    pub fn new(message_type: MessageType, data: Vec<u8>) -> Self {
        Self { message_type: message_type.as_tag().to_string(), data, unique_call_key: String::new(), iv: Vec::new(), error: false }
    }

    /// Parse this envelope's `message_type` tag.
    pub fn parsed_type(&self) -> Result<MessageType, crate::WireError> {
        self.message_type.parse()
    }

    /// Builder-style: set the correlation key.
    pub fn with_call_key(mut self, unique_call_key: impl Into<String>) -> Self {
        self.unique_call_key = unique_call_key.into();
        self
    }

    /// Builder-style: set the error flag.
    pub fn with_error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    /// Builder-style: set the IV (present when the symmetric leg was used).
    pub fn with_iv(mut self, iv: Vec<u8>) -> Self {
        self.iv = iv;
        self
    }
}

/// An encrypted payload plus the signature covering it — the shape `data`
/// decodes to whenever encryption is enabled on the session, independent of
/// whether the symmetric (post-handshake) or asymmetric (handshake) path
/// produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignedMessageData {
    /// The encrypted (or, for the handshake, hybrid-wrapped) raw bytes.
    pub message_raw_data: Vec<u8>,
    /// RSA-PKCS1(SHA-256(message_raw_data)), signed by the sender's private key.
    pub signature: Vec<u8>,
}
