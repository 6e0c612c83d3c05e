//! RSA key pairs, hybrid (RSA-wrapped AES) encryption, and PKCS1/SHA-256 signing.

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{aes, sha256, CryptoError};

/// Minimum key size this crate will generate or accept.
pub const MIN_KEY_SIZE_BITS: usize = 1024;
/// Recommended minimum for production use — see §4.1.
pub const RECOMMENDED_MIN_KEY_SIZE_BITS: usize = 3072;
/// Default key size when the caller does not override it.
pub const DEFAULT_KEY_SIZE_BITS: usize = 4096;

/// An RSA key pair used by one side of a session (server) or a client.
///
/// Immutable after creation: crypto operations are stateless per call.
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    key_size_bits: usize,
}

impl KeyPair {
    /// Generate a fresh key pair of `key_size_bits` bits.
    pub fn generate(key_size_bits: usize) -> Result<Self, CryptoError> {
        if key_size_bits < MIN_KEY_SIZE_BITS {
            return Err(CryptoError::KeySizeTooSmall { size: key_size_bits, minimum: MIN_KEY_SIZE_BITS });
        }
        let private = RsaPrivateKey::new(&mut OsRng, key_size_bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public, key_size_bits })
    }

    /// The key size in bits.
    pub fn key_size_bits(&self) -> usize {
        self.key_size_bits
    }

    /// PKCS#1 DER-encoded public key, suitable for sending over the wire.
    pub fn public_key_blob(&self) -> Vec<u8> {
        self.public
            .to_pkcs1_der()
            .expect("in-memory RSA public key always encodes")
            .as_bytes()
            .to_vec()
    }

    /// PKCS#1 DER-encoded private key. Never sent over the wire; exposed for
    /// session persistence by the embedding application.
    pub fn private_key_blob(&self) -> Vec<u8> {
        self.private
            .to_pkcs1_der()
            .expect("in-memory RSA private key always encodes")
            .as_bytes()
            .to_vec()
    }

    /// This pair's public half, standalone.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public.clone())
    }
}

/// A peer's RSA public key, imported from a wire-carried blob.
#[derive(Clone)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse a PKCS#1 DER-encoded public key blob.
    pub fn from_blob(blob: &[u8]) -> Result<Self, CryptoError> {
        RsaPublicKey::from_pkcs1_der(blob)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKeyBlob(e.to_string()))
    }

    /// Key size in bits.
    pub fn key_size_bits(&self) -> usize {
        self.0.size() * 8
    }
}

/// The result of [`encrypt_secret`] — an RSA-wrapped symmetric session key
/// plus the AES-CBC ciphertext it protects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Ephemeral AES-256 key, RSA-PKCS1-wrapped under the receiver's public key.
    pub encrypted_session_key: Vec<u8>,
    /// Per-message initialization vector.
    pub iv: [u8; 16],
    /// AES-256-CBC-PKCS7 ciphertext of the cleartext payload.
    pub encrypted_message: Vec<u8>,
    /// The sender's public key blob, so the receiver can verify a signature
    /// carried alongside this secret.
    pub senders_public_key_blob: Vec<u8>,
}

/// Hybrid-encrypt `cleartext` for `receiver_public`.
///
/// Generates a fresh AES-256 key and IV, wraps the key with the receiver's
/// RSA public key (RSA-PKCS1), and AES-CBC-PKCS7-encrypts the cleartext.
pub fn encrypt_secret(
    receiver_public: &PublicKey,
    cleartext: &[u8],
    senders_public_key_blob: Vec<u8>,
) -> Result<EncryptedSecret, CryptoError> {
    let mut session_key = [0u8; 32];
    let mut iv = [0u8; 16];
    rand::RngCore::fill_bytes(&mut OsRng, &mut session_key);
    rand::RngCore::fill_bytes(&mut OsRng, &mut iv);

    let encrypted_session_key = receiver_public
        .0
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, &session_key)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    let encrypted_message = aes::encrypt(cleartext, &session_key, &iv);

    Ok(EncryptedSecret { encrypted_session_key, iv, encrypted_message, senders_public_key_blob })
}

/// Inverse of [`encrypt_secret`] using the receiver's own key pair.
pub fn decrypt_secret(receiver: &KeyPair, secret: &EncryptedSecret) -> Result<Vec<u8>, CryptoError> {
    let session_key_bytes = receiver
        .private
        .decrypt(Pkcs1v15Encrypt, &secret.encrypted_session_key)
        .map_err(|e| CryptoError::Decrypt(e.to_string()))?;
    let session_key: [u8; 32] = session_key_bytes
        .try_into()
        .map_err(|_| CryptoError::Decrypt("unwrapped session key has the wrong length".into()))?;

    aes::decrypt(&secret.encrypted_message, &session_key, &secret.iv)
}

/// Sign `raw` with `private`'s key: RSA-PKCS1(SHA-256(raw)).
pub fn sign(private: &KeyPair, raw: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let digest = Sha256::digest(raw);
    private
        .private
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| CryptoError::Sign(e.to_string()))
}

/// Verify `signature` over `raw` against `signer`'s public key.
///
/// Returns `Ok(())` on success, [`CryptoError::SignatureVerification`] on
/// mismatch — callers in the wire layer turn this into a `SecurityError`.
pub fn verify(signer: &PublicKey, raw: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let digest = Sha256::digest(raw);
    signer
        .0
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| CryptoError::SignatureVerification)
}

/// Derive the AES-256 key used for post-handshake symmetric encryption from
/// the session's shared secret (the 16 raw bytes of the session UUID).
pub fn derive_session_key(shared_secret: &[u8]) -> [u8; 32] {
    sha256!(shared_secret)
}
