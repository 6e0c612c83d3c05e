//! Cryptographic primitives for relay-rpc.
//!
//! Provides:
//! - RSA key pairs with PKCS#1 DER import/export of the public half
//! - Hybrid (RSA-wrapped AES-256) encrypt/decrypt of a handshake secret
//! - RSA-PKCS1 sign/verify over SHA-256
//! - AES-256-CBC-PKCS7 helpers for post-handshake symmetric traffic

#![deny(unsafe_code)]

pub mod aes;
mod sha;
pub mod rsa;

pub use rsa::{decrypt_secret, derive_session_key, encrypt_secret, sign, verify, EncryptedSecret, KeyPair, PublicKey};

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Requested key size below [`rsa::MIN_KEY_SIZE_BITS`].
    #[error("key size {size} bits is below the minimum of {minimum} bits")]
    KeySizeTooSmall { size: usize, minimum: usize },

    /// RSA key generation failed.
    #[error("RSA key generation failed: {0}")]
    KeyGeneration(String),

    /// A wire-carried public key blob could not be parsed.
    #[error("invalid public key blob: {0}")]
    InvalidKeyBlob(String),

    /// RSA encryption of the session key failed.
    #[error("RSA encryption failed: {0}")]
    Encrypt(String),

    /// RSA decryption of the session key failed.
    #[error("RSA decryption failed: {0}")]
    Decrypt(String),

    /// AES-CBC-PKCS7 unpadding failed (wrong key, tampered ciphertext, or
    /// truncated input).
    #[error("AES padding is invalid — wrong key or tampered ciphertext")]
    Padding,

    /// RSA-PKCS1 signing failed.
    #[error("RSA signing failed: {0}")]
    Sign(String),

    /// Signature verification failed — the receiving side must treat this
    /// as a `SecurityError` and not trust the accompanying payload.
    #[error("signature verification failed")]
    SignatureVerification,
}
