//! # Digital Signatures
//!
//! Ed25519 signing over *canonical* message bytes.
//!
//! Credentials, revocation lists and shipping consent messages are all
//! structured values. Signing them means agreeing on one byte encoding
//! first. We use JSON with lexicographically sorted object keys and no
//! whitespace: round-tripping through `serde_json::Value` sorts the keys
//! (its map is a `BTreeMap`), so two parties holding the same value
//! always produce the same bytes regardless of struct field order.

use serde::Serialize;
use thiserror::Error;

use super::keys::{VeyKeypair, VeyPublicKey, VeySignature};

/// Errors during signature operations. Intentionally vague.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

/// Sign raw bytes.
pub fn sign(keypair: &VeyKeypair, message: &[u8]) -> VeySignature {
    keypair.sign(message)
}

/// Boolean verification. Never panics, whatever the input.
pub fn verify(public_key: &VeyPublicKey, message: &[u8], signature: &VeySignature) -> bool {
    public_key.verify(message, signature)
}

/// Like [`verify`], but as a `Result` so it composes with `?`.
pub fn verify_strict(
    public_key: &VeyPublicKey,
    message: &[u8],
    signature: &VeySignature,
) -> Result<(), SignatureError> {
    if verify(public_key, message, signature) {
        Ok(())
    } else {
        Err(SignatureError::VerificationFailed)
    }
}

/// Canonical byte encoding of any serializable value: compact JSON with
/// sorted keys.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SignatureError> {
    let value =
        serde_json::to_value(value).map_err(|e| SignatureError::Canonicalization(e.to_string()))?;
    serde_json::to_vec(&value).map_err(|e| SignatureError::Canonicalization(e.to_string()))
}

/// Sign the canonical encoding of `value`, prefixed by a domain tag so a
/// signature over one kind of document can never be replayed as another.
pub fn sign_canonical<T: Serialize + ?Sized>(
    keypair: &VeyKeypair,
    domain: &[u8],
    value: &T,
) -> Result<VeySignature, SignatureError> {
    let message = tagged_message(domain, value)?;
    Ok(keypair.sign(&message))
}

/// Verify a signature produced by [`sign_canonical`].
pub fn verify_canonical<T: Serialize + ?Sized>(
    public_key: &VeyPublicKey,
    domain: &[u8],
    value: &T,
    signature: &VeySignature,
) -> Result<(), SignatureError> {
    let message = tagged_message(domain, value)?;
    verify_strict(public_key, &message, signature)
}

/// `domain || canonical_bytes(value)`. Exposed so wallets can build the
/// exact bytes they are asked to sign.
pub fn tagged_message<T: Serialize + ?Sized>(
    domain: &[u8],
    value: &T,
) -> Result<Vec<u8>, SignatureError> {
    let body = canonical_bytes(value)?;
    let mut message = Vec::with_capacity(domain.len() + body.len());
    message.extend_from_slice(domain);
    message.extend_from_slice(&body);
    Ok(message)
}
