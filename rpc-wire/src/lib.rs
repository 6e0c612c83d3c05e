//! Wire message envelope, serializer adapter contract, and protocol message
//! payload types for relay-rpc.
//!
//! This crate has no I/O and no async runtime dependency — it only describes
//! the shapes carried over the wire and how to turn values into bytes.
//! Transport, encryption, and dispatch live in `relay-rpc-core`.

mod envelope;
mod message_type;
mod messages;
mod serializer;

pub use envelope::{SignedMessageData, WireMessage};
pub use message_type::MessageType;
pub use messages::{
    AuthenticationRequestMessage, AuthenticationResponseMessage, CallContextEntry, Credential,
    GoodbyeMessage, Identity, MethodCallMessage, MethodCallOutParameterMessage,
    MethodCallParameterMessage, MethodCallResultMessage, RemoteDelegateInfo,
    RemoteDelegateInvocationMessage, RemoteExceptionMessage,
};
pub use serializer::{JsonSerializer, Serializer};

/// Errors arising from wire-level encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// `message_type` tag on a `WireMessage` did not match any known value.
    #[error("unknown wire message type: {0}")]
    UnknownMessageType(String),

    /// A value could not be encoded by the active serializer.
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// Bytes could not be decoded by the active serializer.
    #[error("deserialization failed: {0}")]
    Deserialize(String),

    /// The envelope's `data` did not decode to the expected inner shape
    /// (e.g. a `SignedMessageData`, or a specific message payload).
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_round_trips_through_tag() {
        for mt in [
            MessageType::CompleteHandshake,
            MessageType::Auth,
            MessageType::AuthResponse,
            MessageType::Rpc,
            MessageType::RpcResult,
            MessageType::Invoke,
            MessageType::Goodbye,
        ] {
            let tag = mt.as_tag();
            assert_eq!(tag.parse::<MessageType>().unwrap(), mt);
        }
    }

    #[test]
    fn message_type_parse_is_case_insensitive() {
        assert_eq!("RPC".parse::<MessageType>().unwrap(), MessageType::Rpc);
        assert_eq!("Complete_Handshake".parse::<MessageType>().unwrap(), MessageType::CompleteHandshake);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let err = "not_a_type".parse::<MessageType>().unwrap_err();
        assert!(matches!(err, WireError::UnknownMessageType(tag) if tag == "not_a_type"));
    }

    #[test]
    fn envelope_builder_sets_fields() {
        let msg = WireMessage::new(MessageType::Rpc, vec![1, 2, 3])
            .with_call_key("call-1")
            .with_iv(vec![9; 16])
            .with_error(true);
        assert_eq!(msg.parsed_type().unwrap(), MessageType::Rpc);
        assert_eq!(msg.unique_call_key, "call-1");
        assert_eq!(msg.iv, vec![9; 16]);
        assert!(msg.error);
    }

    #[test]
    fn cleartext_envelope_has_empty_call_key_and_iv() {
        let msg = WireMessage::new(MessageType::Goodbye, vec![]);
        assert!(msg.unique_call_key.is_empty());
        assert!(msg.iv.is_empty());
        assert!(!msg.error);
    }
}
