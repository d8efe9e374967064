//! # DID (Decentralized Identifier) Support
//!
//! Address owners are named by `did:key` identifiers (W3C CCG did:key
//! method, Ed25519 variant). The public key *is* the identifier, so anyone
//! holding a DID can verify the owner's signatures without a lookup.
//!
//! ## DID Format
//!
//! ```text
//! did:key:z<base58btc(0xed 0x01 || ed25519-public-key)>
//! ```
//!
//! ## DID Document
//!
//! The generated document follows DID Core v1.0:
//!
//! - `id` - the DID string
//! - `verificationMethod` - the Ed25519 key in multibase form
//! - `authentication` / `assertionMethod` - both reference that key
//! - `created` - when the holder first registered
//!
//! Rotation means a new DID and a new document; documents are never edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::ED25519_MULTICODEC;
use crate::crypto::keys::VeyPublicKey;
use crate::storage::DbError;

const DID_PREFIX: &str = "did:key:";

/// Context URI for the W3C DID Core specification.
const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// Context URI for the Ed25519 verification key suite.
const ED25519_CONTEXT: &str = "https://w3id.org/security/suites/ed25519-2020/v1";

/// Verification method type for Ed25519 public keys.
const VERIFICATION_KEY_TYPE: &str = "Ed25519VerificationKey2020";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DidError {
    #[error("invalid DID format: {0}")]
    InvalidFormat(String),

    #[error("unsupported DID method: {0}")]
    UnsupportedMethod(String),

    #[error("DID does not carry a valid Ed25519 key")]
    InvalidKey,

    #[error("DID {0} is already registered with a different document")]
    Conflict(String),

    #[error("DID not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

// ---------------------------------------------------------------------------
// VeyDid
// ---------------------------------------------------------------------------

/// A `did:key` identifier for an Ed25519 key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VeyDid {
    public_key: VeyPublicKey,
}

impl VeyDid {
    pub fn from_public_key(public_key: &VeyPublicKey) -> Self {
        Self {
            public_key: *public_key,
        }
    }

    /// Parse a `did:key:z…` string and recover its public key.
    pub fn parse(did: &str) -> Result<Self, DidError> {
        let Some(method_specific) = did.strip_prefix(DID_PREFIX) else {
            let method = did.split(':').nth(1).unwrap_or_default();
            return if did.starts_with("did:") {
                Err(DidError::UnsupportedMethod(method.to_string()))
            } else {
                Err(DidError::InvalidFormat("expected 'did:key:' prefix".into()))
            };
        };
        let encoded = method_specific
            .strip_prefix('z')
            .ok_or_else(|| DidError::InvalidFormat("expected base58btc multibase 'z'".into()))?;
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|e| DidError::InvalidFormat(e.to_string()))?;
        let key = bytes
            .strip_prefix(&ED25519_MULTICODEC[..])
            .ok_or_else(|| DidError::InvalidFormat("not an Ed25519 multicodec key".into()))?;
        let public_key = VeyPublicKey::try_from_slice(key).map_err(|_| DidError::InvalidKey)?;
        Ok(Self { public_key })
    }

    pub fn public_key(&self) -> &VeyPublicKey {
        &self.public_key
    }

    /// `z` + base58btc(multicodec || key), shared by the DID and its
    /// verification method.
    pub fn multibase_key(&self) -> String {
        let mut bytes = ED25519_MULTICODEC.to_vec();
        bytes.extend_from_slice(self.public_key.as_bytes());
        format!("z{}", bs58::encode(bytes).into_string())
    }

    pub fn to_did_string(&self) -> String {
        format!("{DID_PREFIX}{}", self.multibase_key())
    }

    /// Build the DID document for this identity.
    pub fn to_did_document(&self, created: DateTime<Utc>) -> DidDocument {
        let did_string = self.to_did_string();
        let key_id = format!("{did_string}#{}", self.multibase_key());

        DidDocument {
            context: vec![DID_CONTEXT.to_string(), ED25519_CONTEXT.to_string()],
            id: did_string.clone(),
            verification_method: vec![VerificationMethod {
                id: key_id.clone(),
                type_: VERIFICATION_KEY_TYPE.to_string(),
                controller: did_string,
                public_key_multibase: self.multibase_key(),
            }],
            authentication: vec![key_id.clone()],
            assertion_method: vec![key_id],
            created,
        }
    }
}

/// Public key behind a `did:key` string.
pub fn did_to_public_key(did: &str) -> Result<VeyPublicKey, DidError> {
    Ok(*VeyDid::parse(did)?.public_key())
}

impl fmt::Display for VeyDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_did_string())
    }
}

impl FromStr for VeyDid {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// DID Document Types
// ---------------------------------------------------------------------------

/// A W3C DID Document describing an address owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    pub id: String,

    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,

    pub authentication: Vec<String>,

    #[serde(rename = "assertionMethod")]
    pub assertion_method: Vec<String>,

    pub created: DateTime<Utc>,
}

impl DidDocument {
    pub fn to_json(&self) -> Result<String, DidError> {
        serde_json::to_string_pretty(self).map_err(|e| DidError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, DidError> {
        serde_json::from_str(json).map_err(|e| DidError::Serialization(e.to_string()))
    }

    /// The identity this document describes.
    pub fn did(&self) -> Result<VeyDid, DidError> {
        VeyDid::parse(&self.id)
    }

    /// Structural checks, plus: the verification method must carry the
    /// same key the DID encodes.
    pub fn validate(&self) -> Result<(), DidError> {
        let did = self.did()?;

        if !self.context.iter().any(|c| c == DID_CONTEXT) {
            return Err(DidError::InvalidFormat(
                "document must include DID Core context".into(),
            ));
        }
        let Some(method) = self.verification_method.first() else {
            return Err(DidError::InvalidFormat(
                "document must have at least one verification method".into(),
            ));
        };
        if method.controller != self.id || method.public_key_multibase != did.multibase_key() {
            return Err(DidError::InvalidFormat(
                "verification method does not match the DID".into(),
            ));
        }
        if self.authentication.is_empty() {
            return Err(DidError::InvalidFormat(
                "document must have at least one authentication method".into(),
            ));
        }
        Ok(())
    }
}

/// A verification method entry in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub id: String,

    #[serde(rename = "type")]
    pub type_: String,

    pub controller: String,

    #[serde(rename = "publicKeyMultibase")]
    pub public_key_multibase: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::VeyKeypair;

    #[test]
    fn did_string_format() {
        let kp = VeyKeypair::generate();
        let did = VeyDid::from_public_key(&kp.public_key());
        let s = did.to_string();
        // Ed25519 did:key identifiers always start with z6Mk.
        assert!(s.starts_with("did:key:z6Mk"), "got: {s}");
    }

    #[test]
    fn parse_recovers_public_key() {
        let kp = VeyKeypair::generate();
        let did = VeyDid::from_public_key(&kp.public_key());
        let parsed = VeyDid::parse(&did.to_did_string()).unwrap();
        assert_eq!(parsed.public_key(), &kp.public_key());
    }

    #[test]
    fn did_to_public_key_matches_signer() {
        let kp = VeyKeypair::generate();
        let did = VeyDid::from_public_key(&kp.public_key()).to_did_string();
        let pk = did_to_public_key(&did).unwrap();
        assert!(pk.verify(b"consent", &kp.sign(b"consent")));
        assert!(did_to_public_key("did:key:zNotBase58!").is_err());
    }

    #[test]
    fn known_did_key_vector() {
        // Test vector from the did:key method specification.
        let did = "did:key:z6MkhaXgBZDvotDkL5257faiztiGiC2QtKLGpbnnEGta2doK";
        let parsed = VeyDid::parse(did).unwrap();
        assert_eq!(parsed.to_did_string(), did);
    }

    #[test]
    fn wrong_method_rejected() {
        assert!(matches!(
            VeyDid::parse("did:ethr:0xabc123"),
            Err(DidError::UnsupportedMethod(m)) if m == "ethr"
        ));
        assert!(matches!(
            VeyDid::parse("notadid"),
            Err(DidError::InvalidFormat(_))
        ));
        assert!(VeyDid::parse("did:key:6Mk").is_err());
    }

    #[test]
    fn document_structure() {
        let kp = VeyKeypair::generate();
        let did = VeyDid::from_public_key(&kp.public_key());
        let doc = did.to_did_document(Utc::now());

        assert_eq!(doc.id, did.to_did_string());
        assert_eq!(doc.verification_method.len(), 1);
        assert_eq!(doc.verification_method[0].type_, VERIFICATION_KEY_TYPE);
        assert_eq!(doc.authentication, doc.assertion_method);
        assert!(doc.validate().is_ok());
        assert_eq!(doc.did().unwrap(), did);
    }

    #[test]
    fn json_uses_w3c_field_names() {
        let did = VeyDid::from_public_key(&VeyKeypair::generate().public_key());
        let json = did.to_did_document(Utc::now()).to_json().unwrap();
        assert!(json.contains("\"@context\""));
        assert!(json.contains("\"verificationMethod\""));
        assert!(json.contains("\"publicKeyMultibase\""));
        let back = DidDocument::from_json(&json).unwrap();
        assert!(back.validate().is_ok());
    }

    #[test]
    fn validate_rejects_swapped_key() {
        let a = VeyDid::from_public_key(&VeyKeypair::generate().public_key());
        let b = VeyDid::from_public_key(&VeyKeypair::generate().public_key());
        let mut doc = a.to_did_document(Utc::now());
        doc.verification_method[0].public_key_multibase = b.multibase_key();
        assert!(doc.validate().is_err());
    }
}
