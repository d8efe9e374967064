//! Revocation entries and the signed, published list.
//!
//! The list is the artifact every verifier fetches. Its JSON shape only
//! ever gains fields; existing ones keep their name and meaning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RevocationError;
use crate::crypto::hash::{blake3_hash, merkle_root};
use crate::crypto::keys::{VeyKeypair, VeyPublicKey, VeySignature};
use crate::crypto::signatures::{canonical_bytes, sign_canonical, verify_canonical};
use crate::pid::Pid;

/// Domain tag for revocation list signatures.
const LIST_DOMAIN: &[u8] = b"vey-revocation-list:v1";

/// What an entry revokes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationSubject {
    Pid(Pid),
    /// A credential id (`urn:uuid:…`).
    Credential(String),
}

impl RevocationSubject {
    /// The string `is_revoked` is queried with.
    pub fn id(&self) -> &str {
        match self {
            RevocationSubject::Pid(pid) => pid.as_str(),
            RevocationSubject::Credential(id) => id,
        }
    }
}

/// Why an entry was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// The holder moved. `new_pid` is the successor.
    AddressChange { new_pid: Pid },
    UserRequest,
    Invalid,
    Expired,
    Compromised,
}

/// One append-only row of the revocation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEntry {
    /// List version this entry created. Strictly increasing, no gaps.
    pub version: u64,
    pub subject: RevocationSubject,
    pub reason: RevocationReason,
    pub revoked_at: DateTime<Utc>,
}

impl RevocationEntry {
    /// Merkle leaf for this entry.
    pub fn digest(&self) -> Result<[u8; 32], RevocationError> {
        Ok(blake3_hash(&canonical_bytes(self)?))
    }
}

/// The signed part of a [`RevocationList`].
#[derive(Serialize)]
struct UnsignedList<'a> {
    version: u64,
    issuer: &'a str,
    updated_at: &'a DateTime<Utc>,
    entries: &'a [RevocationEntry],
    merkle_root: &'a str,
}

/// A signed snapshot of the full revocation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationList {
    /// Version of the newest entry (0 for an empty list).
    pub version: u64,
    /// DID of the registry key.
    pub issuer: String,
    /// When the registry produced this snapshot. Consumers measure
    /// staleness from here.
    pub updated_at: DateTime<Utc>,
    pub entries: Vec<RevocationEntry>,
    /// Hex BLAKE3 Merkle root over entry digests.
    pub merkle_root: String,
    pub signature: VeySignature,
}

impl RevocationList {
    /// Build and sign a snapshot.
    pub fn sign(
        keypair: &VeyKeypair,
        issuer: String,
        updated_at: DateTime<Utc>,
        entries: Vec<RevocationEntry>,
    ) -> Result<Self, RevocationError> {
        let version = entries.last().map(|e| e.version).unwrap_or(0);
        let merkle_root = hex::encode(entries_root(&entries)?);
        let signature = sign_canonical(
            keypair,
            LIST_DOMAIN,
            &UnsignedList {
                version,
                issuer: &issuer,
                updated_at: &updated_at,
                entries: &entries,
                merkle_root: &merkle_root,
            },
        )?;
        Ok(Self {
            version,
            issuer,
            updated_at,
            entries,
            merkle_root,
            signature,
        })
    }

    /// Check the signature and that the Merkle root and version match the
    /// entries actually carried.
    pub fn verify(&self, issuer_key: &VeyPublicKey) -> Result<(), RevocationError> {
        if hex::encode(entries_root(&self.entries)?) != self.merkle_root {
            return Err(RevocationError::BadSignature);
        }
        if self.entries.last().map(|e| e.version).unwrap_or(0) != self.version {
            return Err(RevocationError::BadSignature);
        }
        verify_canonical(
            issuer_key,
            LIST_DOMAIN,
            &UnsignedList {
                version: self.version,
                issuer: &self.issuer,
                updated_at: &self.updated_at,
                entries: &self.entries,
                merkle_root: &self.merkle_root,
            },
            &self.signature,
        )
        .map_err(|_| RevocationError::BadSignature)
    }

    /// The entry revoking `id`, if any.
    pub fn find(&self, id: &str) -> Option<&RevocationEntry> {
        self.entries.iter().find(|e| e.subject.id() == id)
    }

    pub fn is_revoked(&self, id: &str) -> bool {
        self.find(id).is_some()
    }
}

fn entries_root(entries: &[RevocationEntry]) -> Result<[u8; 32], RevocationError> {
    let leaves = entries
        .iter()
        .map(RevocationEntry::digest)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(merkle_root(&leaves))
}
