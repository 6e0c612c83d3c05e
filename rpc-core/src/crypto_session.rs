//! Envelope construction and parsing: §4.2's `create_wire_message` /
//! `decrypt_payload` contract, bridging `relay-rpc-wire`'s envelope types
//! and `relay-rpc-crypto`'s primitives.

use relay_rpc_crypto::{self as crypto, KeyPair, PublicKey};
use relay_rpc_wire::{MessageType, SignedMessageData, WireMessage};
use uuid::Uuid;

use crate::CoreError;

/// The shared secret for a session's post-handshake symmetric traffic: the
/// raw bytes of the session UUID, per §4.1 (`shared_secret = session_uuid_bytes`).
#[derive(Clone, Copy, Debug)]
pub struct SharedSecret(pub Uuid);

impl SharedSecret {
    fn aes_key(&self) -> [u8; 32] {
        crypto::derive_session_key(self.0.as_bytes())
    }
}

/// Build an outgoing envelope, optionally symmetrically encrypting and
/// always signing when encryption is active.
///
/// `shared_secret` absent means encryption is off for this session: the
/// payload is carried in cleartext and no signature is attached.
pub fn create_wire_message(
    message_type: MessageType,
    serialized_payload: Vec<u8>,
    key_pair: &KeyPair,
    shared_secret: Option<SharedSecret>,
    unique_call_key: impl Into<String>,
    error: bool,
) -> Result<WireMessage, CoreError> {
    let unique_call_key = unique_call_key.into();

    let Some(shared_secret) = shared_secret else {
        return Ok(WireMessage::new(message_type, serialized_payload)
            .with_call_key(unique_call_key)
            .with_error(error));
    };

    let mut iv = [0u8; 16];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut iv);

    let inner = crypto::aes::encrypt(&serialized_payload, &shared_secret.aes_key(), &iv);
    let signature = crypto::sign(key_pair, &inner).map_err(CoreError::Crypto)?;
    let signed = SignedMessageData { message_raw_data: inner, signature };
    let data = serde_json::to_vec(&signed).map_err(|e| CoreError::Codec(e.to_string()))?;

    Ok(WireMessage::new(message_type, data)
        .with_call_key(unique_call_key)
        .with_iv(iv.to_vec())
        .with_error(error))
}

/// Build the handshake-completion envelope: `data` carries a
/// `SignedMessageData` whose raw bytes are an RSA-hybrid-wrapped
/// `EncryptedSecret`, not a session-symmetric ciphertext (§4.2 special case).
pub fn create_handshake_message(
    cleartext_payload: &[u8],
    server_key_pair: &KeyPair,
    client_public: &PublicKey,
) -> Result<WireMessage, CoreError> {
    let secret = crypto::encrypt_secret(client_public, cleartext_payload, server_key_pair.public_key_blob())
        .map_err(CoreError::Crypto)?;
    let raw = serde_json::to_vec(&secret).map_err(|e| CoreError::Codec(e.to_string()))?;
    let signature = crypto::sign(server_key_pair, &raw).map_err(CoreError::Crypto)?;
    let signed = SignedMessageData { message_raw_data: raw, signature };
    let data = serde_json::to_vec(&signed).map_err(|e| CoreError::Codec(e.to_string()))?;

    Ok(WireMessage::new(MessageType::CompleteHandshake, data))
}

/// Parse an incoming envelope back to plaintext bytes.
///
/// When `shared_secret` is absent, `wire_message.data` is returned as-is.
/// Otherwise the `SignedMessageData` is deserialized, its signature is
/// verified against the sender's declared public key, and the raw bytes are
/// AES-decrypted using the session's derived key and the envelope's IV.
pub fn decrypt_payload(
    wire_message: &WireMessage,
    shared_secret: Option<SharedSecret>,
    senders_public_key_blob: &[u8],
) -> Result<Vec<u8>, CoreError> {
    let Some(shared_secret) = shared_secret else {
        return Ok(wire_message.data.clone());
    };

    let signed: SignedMessageData =
        serde_json::from_slice(&wire_message.data).map_err(|e| CoreError::Codec(e.to_string()))?;

    let signer = PublicKey::from_blob(senders_public_key_blob).map_err(CoreError::Crypto)?;
    crypto::verify(&signer, &signed.message_raw_data, &signed.signature).map_err(CoreError::Crypto)?;

    let iv: [u8; 16] = wire_message
        .iv
        .clone()
        .try_into()
        .map_err(|_| CoreError::MalformedMessage("envelope IV must be 16 bytes".into()))?;

    crypto::aes::decrypt(&signed.message_raw_data, &shared_secret.aes_key(), &iv).map_err(CoreError::Crypto)
}

/// Inverse of [`create_handshake_message`]: unwrap the RSA-hybrid secret
/// carried in a `complete_handshake` message using the client's own key
/// pair. The server's public key is not known to the client ahead of time —
/// it travels inside the `EncryptedSecret` itself (`senders_public_key_blob`)
/// and is what the signature is verified against, matching the trust-on-
/// first-handshake model the crate assumes (§9 Open Questions).
///
/// Returns the decrypted payload and the server's public key blob, so the
/// caller can retain it for verifying subsequent symmetric traffic.
pub fn decrypt_handshake_message(
    wire_message: &WireMessage,
    client_key_pair: &KeyPair,
) -> Result<(Vec<u8>, Vec<u8>), CoreError> {
    let signed: SignedMessageData =
        serde_json::from_slice(&wire_message.data).map_err(|e| CoreError::Codec(e.to_string()))?;

    let secret: crypto::EncryptedSecret =
        serde_json::from_slice(&signed.message_raw_data).map_err(|e| CoreError::Codec(e.to_string()))?;

    let signer = PublicKey::from_blob(&secret.senders_public_key_blob).map_err(CoreError::Crypto)?;
    crypto::verify(&signer, &signed.message_raw_data, &signed.signature).map_err(CoreError::Crypto)?;

    let plain = crypto::decrypt_secret(client_key_pair, &secret).map_err(CoreError::Crypto)?;
    Ok((plain, secret.senders_public_key_blob))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleartext_round_trip_when_no_shared_secret() {
        let kp = KeyPair::generate(1024).unwrap();
        let msg = create_wire_message(MessageType::Rpc, b"payload".to_vec(), &kp, None, "call-1", false).unwrap();
        assert!(msg.iv.is_empty());
        assert_eq!(decrypt_payload(&msg, None, &[]).unwrap(), b"payload");
    }

    #[test]
    fn symmetric_round_trip_with_shared_secret() {
        let server_kp = KeyPair::generate(1024).unwrap();
        let secret = SharedSecret(Uuid::new_v4());

        let msg =
            create_wire_message(MessageType::Rpc, b"hello".to_vec(), &server_kp, Some(secret), "call-2", false)
                .unwrap();
        assert_eq!(msg.iv.len(), 16);

        let plain = decrypt_payload(&msg, Some(secret), &server_kp.public_key_blob()).unwrap();
        assert_eq!(plain, b"hello");
    }

    #[test]
    fn wrong_signer_key_is_rejected() {
        let server_kp = KeyPair::generate(1024).unwrap();
        let impostor_kp = KeyPair::generate(1024).unwrap();
        let secret = SharedSecret(Uuid::new_v4());

        let msg =
            create_wire_message(MessageType::Rpc, b"hello".to_vec(), &server_kp, Some(secret), "call-3", false)
                .unwrap();

        let err = decrypt_payload(&msg, Some(secret), &impostor_kp.public_key_blob()).unwrap_err();
        assert!(matches!(err, CoreError::Crypto(_)));
    }

    #[test]
    fn handshake_message_uses_asymmetric_path() {
        let server_kp = KeyPair::generate(1024).unwrap();
        let client_kp = KeyPair::generate(1024).unwrap();

        let msg = create_handshake_message(b"session-secret", &server_kp, &client_kp.public_key()).unwrap();
        assert_eq!(msg.parsed_type().unwrap(), MessageType::CompleteHandshake);

        let (plain, server_public_key_blob) = decrypt_handshake_message(&msg, &client_kp).unwrap();
        assert_eq!(plain, b"session-secret");
        assert_eq!(server_public_key_blob, server_kp.public_key_blob());
    }
}
