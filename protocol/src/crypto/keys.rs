//! # Key Management
//!
//! Ed25519 keypairs for every signer in VEY: address owners (whose keys
//! back their `did:key`), credential issuers, and the revocation registry.
//!
//! ## Security considerations
//!
//! - Private keys are zeroized on drop (ed25519-dalek does this for us).
//! - Fresh keys come from `OsRng`.
//! - Key bytes are never logged. `Debug` prints the public half only.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

use crate::config::{SIGNATURE_LENGTH, VERIFYING_KEY_LENGTH};

/// Errors that can occur during key operations.
///
/// Vague on purpose. Error messages are not the place to describe key
/// material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,
}

/// An Ed25519 keypair.
///
/// Deliberately not `Serialize`. Exporting a secret goes through
/// [`secret_key_bytes`](Self::secret_key_bytes) so it is always a visible
/// decision in the calling code.
pub struct VeyKeypair {
    signing_key: SigningKey,
}

/// The public half of a keypair. Serialized as 64 hex characters.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct VeyPublicKey {
    bytes: [u8; VERIFYING_KEY_LENGTH],
}

/// A detached Ed25519 signature. Serialized as 128 hex characters.
#[derive(Clone, PartialEq, Eq)]
pub struct VeySignature {
    bytes: [u8; SIGNATURE_LENGTH],
}

// ---------------------------------------------------------------------------
// VeyKeypair
// ---------------------------------------------------------------------------

impl VeyKeypair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. In Ed25519 the seed is the
    /// secret key, so a weak seed is a weak key.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Load a keypair from a hex-encoded secret key (the node's key files).
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> VeyPublicKey {
        VeyPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message. Ed25519 is deterministic: same key and message, same
    /// signature.
    pub fn sign(&self, message: &[u8]) -> VeySignature {
        VeySignature {
            bytes: self.signing_key.sign(message).to_bytes(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &VeySignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Raw secret key bytes. Handle with care: whoever holds these *is*
    /// this signer.
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }

    /// Hex-encoded secret key, the format written by `vey-node init`.
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key_bytes())
    }
}

impl Clone for VeyKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for VeyKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VeyKeypair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// VeyPublicKey
// ---------------------------------------------------------------------------

impl VeyPublicKey {
    /// Build a public key from raw bytes, rejecting bytes that do not
    /// decompress to a curve point.
    pub fn from_bytes(bytes: [u8; VERIFYING_KEY_LENGTH]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; VERIFYING_KEY_LENGTH] =
            slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VERIFYING_KEY_LENGTH] {
        &self.bytes
    }

    /// Returns `true` only for a valid signature over `message`. Callers
    /// that need the reason use [`crate::crypto::signatures::verify_strict`].
    pub fn verify(&self, message: &[u8], signature: &VeySignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let dalek_sig = DalekSignature::from_bytes(&signature.bytes);
        verifying_key.verify(message, &dalek_sig).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        Self::try_from_slice(&bytes)
    }
}

impl Hash for VeyPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for VeyPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for VeyPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VeyPublicKey({})", &self.to_hex()[..16])
    }
}

impl Serialize for VeyPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for VeyPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// VeySignature
// ---------------------------------------------------------------------------

impl VeySignature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let raw = hex::decode(s).map_err(|_| KeyError::InvalidSignature)?;
        let bytes: [u8; SIGNATURE_LENGTH] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for VeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for VeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        write!(f, "VeySignature({}...{})", &hex_str[..8], &hex_str[120..])
    }
}

impl Serialize for VeySignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for VeySignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let kp = VeyKeypair::generate();
        let sig = kp.sign(b"consent to ship");
        assert!(kp.verify(b"consent to ship", &sig));
        assert!(!kp.verify(b"consent to ship elsewhere", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = VeyKeypair::generate();
        let kp2 = VeyKeypair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.verify(b"message", &sig));
    }

    #[test]
    fn deterministic_from_seed() {
        let kp1 = VeyKeypair::from_seed(&[42u8; 32]);
        let kp2 = VeyKeypair::from_seed(&[42u8; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.sign(b"x"), kp2.sign(b"x"));
    }

    #[test]
    fn secret_hex_roundtrip() {
        let kp = VeyKeypair::generate();
        let restored = VeyKeypair::from_hex(&kp.secret_key_hex()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn invalid_secret_hex_rejected() {
        assert_eq!(
            VeyKeypair::from_hex("deadbeef").unwrap_err(),
            KeyError::InvalidSecretKey
        );
        assert!(VeyKeypair::from_hex("not-hex-at-all").is_err());
    }

    #[test]
    fn public_key_rejects_wrong_length() {
        assert!(VeyPublicKey::try_from_slice(&[0u8; 16]).is_err());
    }

    #[test]
    fn public_key_serde_is_hex() {
        let pk = VeyKeypair::from_seed(&[7u8; 32]).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_hex()));
        let back: VeyPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(pk, back);
    }

    #[test]
    fn signature_serde_survives_bincode() {
        let sig = VeyKeypair::generate().sign(b"stored");
        let bytes = bincode::serialize(&sig).unwrap();
        let back: VeySignature = bincode::deserialize(&bytes).unwrap();
        assert_eq!(sig, back);
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = VeyKeypair::generate();
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("VeyKeypair(pub="));
        assert!(!debug_str.contains(&kp.secret_key_hex()));
    }
}
