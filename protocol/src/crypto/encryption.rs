//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for address records at rest.
//!
//! The literal address behind a PID (building and unit included) never
//! leaves the vault in clear. Every record is sealed with AES-256-GCM under
//! the vault key, and the PID itself is passed as Additional Authenticated
//! Data: a ciphertext copied under another PID fails authentication instead
//! of decrypting to the wrong address.
//!
//! ## Wire format
//!
//! `seal()` returns `nonce || ciphertext || tag` in one buffer. Nonces are
//! 96 random bits from `OsRng`; the birthday bound (~2^48 records per key)
//! is far beyond any vault.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH};

/// Errors that can occur during encryption/decryption.
///
/// Deliberately coarse: wrong key, wrong AAD and corrupted ciphertext all
/// look the same from outside.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key, wrong context or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid key length: expected {AES_KEY_LENGTH} bytes")]
    InvalidKeyLength,

    #[error("ciphertext too short")]
    CiphertextTooShort,
}

/// Encrypt `plaintext` bound to `aad`. Returns `nonce || ciphertext`.
pub fn seal(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a buffer produced by [`seal`]. The same `aad` must be supplied.
pub fn open(key: &[u8; AES_KEY_LENGTH], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if sealed.len() < AES_NONCE_LENGTH + AES_TAG_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// Parse a key that arrives as a slice (hex-decoded key files, env vars).
pub fn key_from_slice(key: &[u8]) -> Result<[u8; AES_KEY_LENGTH], EncryptionError> {
    key.try_into().map_err(|_| EncryptionError::InvalidKeyLength)
}

/// Fresh random key from the OS RNG.
pub fn generate_key() -> [u8; AES_KEY_LENGTH] {
    let mut key = [0u8; AES_KEY_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}
