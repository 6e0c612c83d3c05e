//! AES-256-CBC with PKCS7 padding.
//!
//! Used for the symmetric leg of both the hybrid (RSA-wrapped) handshake
//! secret and the per-session post-handshake envelope encryption, where the
//! key is `SHA-256(shared_secret)`.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::CryptoError;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

/// Encrypt `plaintext` with AES-256-CBC-PKCS7 under `key`/`iv`.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32], iv: &[u8; 16]) -> Vec<u8> {
    Encryptor::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt an AES-256-CBC-PKCS7 ciphertext under `key`/`iv`.
pub fn decrypt(ciphertext: &[u8], key: &[u8; 32], iv: &[u8; 16]) -> Result<Vec<u8>, CryptoError> {
    Decryptor::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Padding)
}
