//! Issuing, checking and re-issuing address credentials.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::address::{AddressCredential, UnsignedCredential, CREDENTIAL_DOMAIN, CREDENTIAL_TYPE};
use super::CredentialError;
use crate::crypto::keys::{VeyKeypair, VeyPublicKey};
use crate::crypto::signatures::{sign_canonical, verify_canonical};
use crate::identity::VeyDid;
use crate::pid::Pid;
use crate::revocation::{RevocationError, RevocationReason, RevocationRegistry};

/// Holds the issuer signing key.
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    keypair: VeyKeypair,
    did: String,
}

impl CredentialIssuer {
    pub fn new(keypair: VeyKeypair) -> Self {
        let did = VeyDid::from_public_key(&keypair.public_key()).to_did_string();
        Self { keypair, did }
    }

    /// Issuer DID, as written into every credential.
    pub fn did(&self) -> &str {
        &self.did
    }

    pub fn public_key(&self) -> VeyPublicKey {
        self.keypair.public_key()
    }

    /// Issue a credential binding `holder_did` to `pid`, valid from now
    /// for `ttl`.
    pub fn issue(
        &self,
        holder_did: &str,
        pid: &Pid,
        ttl: Duration,
    ) -> Result<AddressCredential, CredentialError> {
        self.issue_at(holder_did, pid, Utc::now(), ttl)
    }

    /// [`issue`](Self::issue) with an explicit issuance time.
    pub fn issue_at(
        &self,
        holder_did: &str,
        pid: &Pid,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<AddressCredential, CredentialError> {
        if ttl <= Duration::zero() {
            return Err(CredentialError::InvalidTtl);
        }
        VeyDid::parse(holder_did)?;

        let id = format!("urn:uuid:{}", Uuid::new_v4());
        let expires_at = issued_at + ttl;
        let signature = sign_canonical(
            &self.keypair,
            CREDENTIAL_DOMAIN,
            &UnsignedCredential {
                id: &id,
                credential_type: CREDENTIAL_TYPE,
                did: holder_did,
                pid,
                issuer: &self.did,
                issued_at: &issued_at,
                expires_at: &expires_at,
            },
        )?;
        let credential = AddressCredential {
            id,
            credential_type: CREDENTIAL_TYPE.to_string(),
            did: holder_did.to_string(),
            pid: pid.clone(),
            issuer: self.did.clone(),
            issued_at,
            expires_at,
            signature,
        };

        info!(credential = %credential.id, %pid, "issued address credential");
        Ok(credential)
    }

    /// Full check at `now`: issuer, signature, then validity window.
    pub fn check(
        credential: &AddressCredential,
        issuer_key: &VeyPublicKey,
        now: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        if credential.issuer != VeyDid::from_public_key(issuer_key).to_did_string() {
            return Err(CredentialError::IssuerMismatch);
        }
        if credential.credential_type != CREDENTIAL_TYPE {
            return Err(CredentialError::BadSignature);
        }
        verify_canonical(
            issuer_key,
            CREDENTIAL_DOMAIN,
            &credential.unsigned(),
            &credential.signature,
        )
        .map_err(|_| CredentialError::BadSignature)?;

        if now < credential.issued_at {
            return Err(CredentialError::NotYetValid {
                issued_at: credential.issued_at,
            });
        }
        if credential.is_expired(now) {
            return Err(CredentialError::Expired {
                expired_at: credential.expires_at,
            });
        }
        Ok(())
    }

    /// `true` when [`check`](Self::check) passes at the current time.
    pub fn verify(credential: &AddressCredential, issuer_key: &VeyPublicKey) -> bool {
        match Self::check(credential, issuer_key, Utc::now()) {
            Ok(()) => true,
            Err(e) => {
                debug!(credential = %credential.id, error = %e, "credential rejected");
                false
            }
        }
    }

    /// Supersede `old` with a credential for `new_pid`.
    ///
    /// The old PID is revoked (reason `AddressChange`) first. If that fails
    /// no credential is returned. A retry after a crash between the two
    /// steps finds the matching entry already present and continues.
    pub fn reissue(
        &self,
        old: &AddressCredential,
        new_pid: &Pid,
        registry: &RevocationRegistry,
    ) -> Result<AddressCredential, CredentialError> {
        let reason = RevocationReason::AddressChange {
            new_pid: new_pid.clone(),
        };
        match registry.revoke_pid(&old.pid, reason.clone()) {
            Ok(entry) => debug!(version = entry.version, "old PID revoked for re-issue"),
            Err(RevocationError::AlreadyRevoked(_)) => {
                let existing = registry.entry_for(old.pid.as_str())?;
                if existing.map(|e| e.reason) != Some(reason) {
                    warn!(pid = %old.pid, "re-issue refused: PID revoked for another reason");
                    return Err(CredentialError::Revocation(RevocationError::AlreadyRevoked(
                        old.pid.to_string(),
                    )));
                }
            }
            Err(e) => return Err(e.into()),
        }

        let ttl = if old.ttl() > Duration::zero() {
            old.ttl()
        } else {
            crate::credential::default_ttl()
        };
        self.issue(&old.did, new_pid, ttl)
    }
}
