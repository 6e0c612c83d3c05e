//! The fixed set of wire message type tags (§6).

use std::fmt;
use std::str::FromStr;

use crate::WireError;

/// A wire message type tag. Case-insensitive on receive, lowercase on send.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MessageType {
    /// S→C: completes the handshake, carries the new session UUID.
    CompleteHandshake,
    /// C→S: carries an `AuthenticationRequestMessage`.
    Auth,
    /// S→C: carries an `AuthenticationResponseMessage`.
    AuthResponse,
    /// C→S: carries a `MethodCallMessage`.
    Rpc,
    /// S→C: carries a `MethodCallResultMessage` or a serialized remote exception.
    RpcResult,
    /// S→C: carries a `RemoteDelegateInvocationMessage`.
    Invoke,
    /// Either direction: carries a `GoodbyeMessage` (reply may be empty).
    Goodbye,
}

impl MessageType {
    /// The lowercase wire tag for this message type.
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::CompleteHandshake => "complete_handshake",
            Self::Auth => "auth",
            Self::AuthResponse => "auth_response",
            Self::Rpc => "rpc",
            Self::RpcResult => "rpc_result",
            Self::Invoke => "invoke",
            Self::Goodbye => "goodbye",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for MessageType {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "complete_handshake" => Ok(Self::CompleteHandshake),
            "auth" => Ok(Self::Auth),
            "auth_response" => Ok(Self::AuthResponse),
            "rpc" => Ok(Self::Rpc),
            "rpc_result" => Ok(Self::RpcResult),
            "invoke" => Ok(Self::Invoke),
            "goodbye" => Ok(Self::Goodbye),
            other => Err(WireError::UnknownMessageType(other.to_string())),
        }
    }
}
