//! The `AddressPIDCredential` document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::keys::VeySignature;
use crate::pid::Pid;

/// `type` of every credential this crate issues.
pub const CREDENTIAL_TYPE: &str = "AddressPIDCredential";

/// Domain tag for credential signatures.
pub(crate) const CREDENTIAL_DOMAIN: &[u8] = b"vey-address-credential:v1";

/// A signed binding of a holder DID to a PID.
///
/// Immutable once issued. An address change produces a new credential and
/// revokes the old PID; the old credential is never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressCredential {
    /// `urn:uuid:<v4>`.
    pub id: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    /// Holder DID.
    pub did: String,
    pub pid: Pid,
    /// Issuer DID.
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: VeySignature,
}

/// Everything in an [`AddressCredential`] except the signature.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UnsignedCredential<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub credential_type: &'a str,
    pub did: &'a str,
    pub pid: &'a Pid,
    pub issuer: &'a str,
    pub issued_at: &'a DateTime<Utc>,
    pub expires_at: &'a DateTime<Utc>,
}

impl AddressCredential {
    pub(crate) fn unsigned(&self) -> UnsignedCredential<'_> {
        UnsignedCredential {
            id: &self.id,
            credential_type: &self.credential_type,
            did: &self.did,
            pid: &self.pid,
            issuer: &self.issuer,
            issued_at: &self.issued_at,
            expires_at: &self.expires_at,
        }
    }

    /// Lifetime the credential was issued with.
    pub fn ttl(&self) -> chrono::Duration {
        self.expires_at - self.issued_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
