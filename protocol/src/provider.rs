//! # Address Provider
//!
//! The operator-side façade. One `AddressProvider` owns every store on a
//! single [`VeyDB`] and runs the holder-facing flows end to end:
//!
//! ```text
//! register_address ── vault.register ─► dids.register ─► issuer.issue ─► credentials.put
//! change_address   ── vault.register ─► issuer.reissue (revokes old PID) ─► credentials.put
//! revoke_pid       ── revocations.revoke_pid
//! ```
//!
//! Shipping validation, resolution, waybills and tracking are exposed
//! through accessors so the node can route requests straight to them.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::AES_KEY_LENGTH;
use crate::credential::{default_ttl, AddressCredential, CredentialIssuer, CredentialStore};
use crate::crypto::encryption::generate_key;
use crate::crypto::keys::VeyKeypair;
use crate::error::{Result, VeyError};
use crate::identity::{DidDocument, DidRegistry, VeyDid};
use crate::pid::{NormalizedAddress, Pid, Precision};
use crate::resolver::{Resolver, SledAuditLog};
use crate::revocation::{RevocationEntry, RevocationReason, RevocationRegistry, RevocationView};
use crate::shipping::{ShippingValidator, TrackingLog, WaybillBook};
use crate::storage::VeyDB;
use crate::vault::AddressVault;
use crate::zkp::{ShippingProver, ZkCircuit};

/// Long-lived secrets of one provider deployment.
#[derive(Clone)]
pub struct ProviderSecrets {
    pub vault_key: [u8; AES_KEY_LENGTH],
    pub issuer: VeyKeypair,
    pub registry: VeyKeypair,
    pub token_secret: [u8; 32],
}

impl ProviderSecrets {
    pub fn generate() -> Self {
        Self {
            vault_key: generate_key(),
            issuer: VeyKeypair::generate(),
            registry: VeyKeypair::generate(),
            token_secret: generate_key(),
        }
    }
}

impl std::fmt::Debug for ProviderSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSecrets")
            .field("issuer", &self.issuer.public_key())
            .field("registry", &self.registry.public_key())
            .finish_non_exhaustive()
    }
}

/// Result of registering or moving an address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub pid: Pid,
    pub did_document: DidDocument,
    pub credential: AddressCredential,
}

#[derive(Debug, Clone)]
pub struct AddressProvider {
    db: VeyDB,
    vault: AddressVault,
    dids: DidRegistry,
    issuer: CredentialIssuer,
    credentials: CredentialStore,
    revocations: RevocationRegistry,
    validator: ShippingValidator,
    resolver: Resolver,
    waybills: WaybillBook,
    tracking: TrackingLog,
}

impl AddressProvider {
    pub fn new(db: VeyDB, secrets: ProviderSecrets, prover: Arc<ShippingProver>) -> Self {
        let vault = AddressVault::new(db.clone(), secrets.vault_key);
        let dids = DidRegistry::new(db.clone());
        let issuer = CredentialIssuer::new(secrets.issuer);
        let credentials = CredentialStore::new(db.clone());
        let revocations = RevocationRegistry::new(db.clone(), secrets.registry);
        let waybills = WaybillBook::new(db.clone(), prover.circuit().clone());
        let tracking = TrackingLog::new(db.clone());
        let validator = ShippingValidator::new(
            vault.clone(),
            credentials.clone(),
            revocations.clone(),
            issuer.public_key(),
            prover,
            secrets.token_secret,
        );
        let resolver = Resolver::new(
            vault.clone(),
            revocations.clone(),
            Arc::new(SledAuditLog::new(db.clone())),
            waybills.clone(),
            tracking.clone(),
        );
        Self {
            db,
            vault,
            dids,
            issuer,
            credentials,
            revocations,
            validator,
            resolver,
            waybills,
            tracking,
        }
    }

    /// Register `address` for the holder of `owner_did`, publish the
    /// holder's DID document and issue an address credential.
    pub fn register_address(
        &self,
        address: &NormalizedAddress,
        owner_did: &str,
        precision: Precision,
    ) -> Result<Registration> {
        let did = VeyDid::parse(owner_did)?;
        let did_document = self.dids.register(&did.to_did_document(Utc::now()))?;
        let pid = self.vault.register(address, owner_did, precision)?;
        let credential = self.issuer.issue(owner_did, &pid, default_ttl())?;
        self.credentials.put(&credential)?;
        info!(%pid, credential = %credential.id, "address registered");
        Ok(Registration {
            pid,
            did_document,
            credential,
        })
    }

    /// Move the holder of `old_pid` to `new_address`.
    ///
    /// The old PID is revoked with reason `AddressChange` before the new
    /// credential exists, so there is never a window with two live PIDs.
    /// Moving back to an earlier address yields a fresh PID; the vault
    /// never reuses a revoked one.
    pub fn change_address(
        &self,
        old_pid: &Pid,
        owner_did: &str,
        new_address: &NormalizedAddress,
        precision: Precision,
    ) -> Result<Registration> {
        let owner = self
            .vault
            .owner(old_pid)?
            .ok_or_else(|| VeyError::NotFound("unknown PID".into()))?;
        if owner != owner_did {
            return Err(VeyError::Authentication(
                "PID is registered to a different holder".into(),
            ));
        }
        let old = self
            .credentials
            .get(old_pid)?
            .ok_or_else(|| VeyError::NotFound("no credential for PID".into()))?;

        let new_pid = self.vault.register(new_address, owner_did, precision)?;
        if new_pid == *old_pid {
            return Err(VeyError::Validation(
                "new address maps to the current PID".into(),
            ));
        }
        let credential = self.issuer.reissue(&old, &new_pid, &self.revocations)?;
        self.credentials.put(&credential)?;
        let did_document = self
            .dids
            .resolve(owner_did)?
            .ok_or_else(|| VeyError::NotFound("DID document".into()))?;
        info!(from = %old_pid, to = %new_pid, "address changed");
        Ok(Registration {
            pid: new_pid,
            did_document,
            credential,
        })
    }

    pub fn revoke_pid(&self, pid: &Pid, reason: RevocationReason) -> Result<RevocationEntry> {
        if !self.vault.contains(pid)? {
            return Err(VeyError::NotFound("unknown PID".into()));
        }
        Ok(self.revocations.revoke_pid(pid, reason)?)
    }

    /// A freshly published, verified view of the revocation list.
    pub fn revocation_view(&self) -> Result<RevocationView> {
        let list = self.revocations.publish()?;
        Ok(RevocationView::new(list, self.revocations.public_key())?)
    }

    // -- Accessors -----------------------------------------------------------

    pub fn db(&self) -> &VeyDB {
        &self.db
    }

    pub fn dids(&self) -> &DidRegistry {
        &self.dids
    }

    pub fn issuer(&self) -> &CredentialIssuer {
        &self.issuer
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn revocations(&self) -> &RevocationRegistry {
        &self.revocations
    }

    pub fn validator(&self) -> &ShippingValidator {
        &self.validator
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn waybills(&self) -> &WaybillBook {
        &self.waybills
    }

    pub fn tracking(&self) -> &TrackingLog {
        &self.tracking
    }

    pub fn circuit(&self) -> &ZkCircuit {
        self.validator.prover().circuit()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shipping::{ParcelInfo, ShippingCondition, ShippingValidationRequest, WaybillRequest};
    use crate::zkp::test_prover;

    fn provider() -> AddressProvider {
        let bytes = test_prover().to_bytes().unwrap();
        AddressProvider::new(
            VeyDB::open_temporary().unwrap(),
            ProviderSecrets::generate(),
            Arc::new(ShippingProver::from_bytes(&bytes).unwrap()),
        )
    }

    fn holder_did() -> String {
        VeyDid::from_public_key(&VeyKeypair::generate().public_key()).to_did_string()
    }

    fn shibuya() -> NormalizedAddress {
        NormalizedAddress::new("JP")
            .with_admin1("13")
            .with_locality("SHIBUYA")
            .with_block("1-2")
            .with_unit("305")
    }

    #[test]
    fn register_issues_verifiable_credential() {
        let p = provider();
        let did = holder_did();
        let reg = p.register_address(&shibuya(), &did, Precision::Locality).unwrap();

        assert_eq!(reg.did_document.id, did);
        assert_eq!(reg.credential.pid, reg.pid);
        assert!(CredentialIssuer::verify(&reg.credential, &p.issuer().public_key()));
        assert_eq!(p.credentials().get(&reg.pid).unwrap(), Some(reg.credential));
    }

    #[test]
    fn register_rejects_bad_did() {
        let p = provider();
        let err = p
            .register_address(&shibuya(), "did:web:example.com", Precision::Locality)
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[test]
    fn change_address_revokes_old_pid() {
        let p = provider();
        let did = holder_did();
        let old = p.register_address(&shibuya(), &did, Precision::Locality).unwrap();
        let osaka = NormalizedAddress::new("JP").with_admin1("27").with_locality("KITA");
        let new = p.change_address(&old.pid, &did, &osaka, Precision::Locality).unwrap();

        assert_ne!(new.pid, old.pid);
        assert!(p.revocations().is_revoked(old.pid.as_str(), None).unwrap());
        assert_eq!(p.revocations().successor(&old.pid).unwrap(), Some(new.pid.clone()));
        assert_eq!(new.credential.did, did);
    }

    #[test]
    fn moving_back_to_an_earlier_address_gets_a_live_pid() {
        let p = provider();
        let did = holder_did();
        let osaka = NormalizedAddress::new("JP").with_admin1("27").with_locality("KITA");

        let first = p.register_address(&shibuya(), &did, Precision::Locality).unwrap();
        let second = p.change_address(&first.pid, &did, &osaka, Precision::Locality).unwrap();
        let back = p.change_address(&second.pid, &did, &shibuya(), Precision::Locality).unwrap();

        assert_ne!(back.pid, first.pid);
        assert_ne!(back.pid, second.pid);
        assert_eq!(back.pid.inspect().unwrap().collision, Some(1));
        assert!(!p.revocations().is_revoked(back.pid.as_str(), None).unwrap());
        assert!(p.revocations().is_revoked(first.pid.as_str(), None).unwrap());
        assert!(p.revocations().is_revoked(second.pid.as_str(), None).unwrap());

        // The successor chain runs forward and ends at the live PID.
        assert_eq!(p.revocations().successor(&first.pid).unwrap(), Some(back.pid.clone()));
        assert_eq!(p.revocations().successor(&second.pid).unwrap(), Some(back.pid.clone()));
        assert_eq!(p.revocations().successor(&back.pid).unwrap(), None);
        assert_eq!(p.credentials().get(&back.pid).unwrap(), Some(back.credential));
    }

    #[test]
    fn re_registering_a_revoked_address_gets_a_live_pid() {
        let p = provider();
        let did = holder_did();
        let first = p.register_address(&shibuya(), &did, Precision::Locality).unwrap();
        p.revoke_pid(&first.pid, RevocationReason::UserRequest).unwrap();

        let again = p.register_address(&shibuya(), &did, Precision::Locality).unwrap();
        assert_ne!(again.pid, first.pid);
        assert!(!p.revocations().is_revoked(again.pid.as_str(), None).unwrap());
        assert!(CredentialIssuer::verify(&again.credential, &p.issuer().public_key()));
    }

    #[test]
    fn proof_cannot_be_moved_onto_a_pid_in_another_country() {
        let p = provider();
        let holder = VeyKeypair::generate();
        let did = VeyDid::from_public_key(&holder.public_key()).to_did_string();
        let jp = p.register_address(&shibuya(), &did, Precision::Locality).unwrap();
        let palo_alto = NormalizedAddress::new("US").with_admin1("CA").with_locality("PALO-ALTO");
        let us = p
            .register_address(&palo_alto, &holder_did(), Precision::Locality)
            .unwrap();

        let jp_only = ShippingCondition::default().countries(["JP"]);
        let request = ShippingValidationRequest::signed(
            &holder,
            jp.pid.clone(),
            jp_only.clone(),
            "shop-1",
            Utc::now(),
            Some(ParcelInfo::new(1.0, None)),
        )
        .unwrap();
        let proof = p.validator().validate(&request, Utc::now()).unwrap().zk_proof.unwrap();
        assert!(crate::zkp::verify(&proof, p.circuit(), &jp_only).valid);

        let mut relabelled = proof;
        relabelled.public_inputs.pid = us.pid.clone();
        assert!(!crate::zkp::verify(&relabelled, p.circuit(), &jp_only).valid);

        let err = p
            .waybills()
            .create(
                WaybillRequest {
                    pid: us.pid,
                    zk_proof: relabelled,
                    conditions: jp_only,
                    parcel_weight: Some(1.0),
                    parcel_size: None,
                    carrier_zone: None,
                    sender: None,
                    recipient: None,
                    carrier: None,
                },
                &p.revocation_view().unwrap(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            crate::shipping::ShippingError::Proof(crate::zkp::ZkpError::PidOutsideConditions)
        ));
    }

    #[test]
    fn change_address_requires_owner() {
        let p = provider();
        let old = p
            .register_address(&shibuya(), &holder_did(), Precision::Locality)
            .unwrap();
        let osaka = NormalizedAddress::new("JP").with_admin1("27");
        let err = p
            .change_address(&old.pid, &holder_did(), &osaka, Precision::Admin1)
            .unwrap_err();
        assert_eq!(err.kind(), "AUTHENTICATION_ERROR");
        assert!(!p.revocations().is_revoked(old.pid.as_str(), None).unwrap());
    }

    #[test]
    fn revoke_unknown_pid_is_not_found() {
        let p = provider();
        let pid = crate::pid::encode(&shibuya(), Precision::Locality).unwrap();
        assert_eq!(
            p.revoke_pid(&pid, RevocationReason::UserRequest).unwrap_err().kind(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn revocation_view_reflects_registry() {
        let p = provider();
        let reg = p
            .register_address(&shibuya(), &holder_did(), Precision::Locality)
            .unwrap();
        p.revoke_pid(&reg.pid, RevocationReason::UserRequest).unwrap();
        let view = p.revocation_view().unwrap();
        assert_eq!(view.version(), 1);
        assert!(view.check(reg.pid.as_str(), Utc::now()).is_err());
    }
}
