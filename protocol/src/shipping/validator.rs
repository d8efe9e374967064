//! # Shipping Validator
//!
//! Server-side half of a shipping check. The validator owns the vault and
//! the proving key, evaluates the requester's conditions against the true
//! address and returns a proof plus an unlinkable `pidToken`.
//!
//! ```text
//! Received ──► AddressResolved ──► ConditionEvaluated ──► ProofGenerated
//!    │               │                     │
//!    └───────────────┴─────────────────────┴──────────► Rejected
//! ```
//!
//! Every step fails closed. Outward responses built by [`ShippingValidator::handle`]
//! carry a generic message only; a failed condition is always reported as
//! "conditions not met", whichever predicate it was.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::condition::{ParcelInfo, ShippingCondition};
use super::ShippingError;
use crate::config::{DOMAIN_PID_TOKEN, MAX_CLOCK_SKEW, MAX_REQUEST_AGE, SHIPPING_CONSENT_TAG};
use crate::credential::{CredentialIssuer, CredentialStore};
use crate::crypto::hash::keyed_hash;
use crate::crypto::keys::{VeyKeypair, VeyPublicKey, VeySignature};
use crate::crypto::signatures::{tagged_message, SignatureError};
use crate::identity::VeyDid;
use crate::pid::Pid;
use crate::revocation::RevocationRegistry;
use crate::vault::{AddressVault, VaultError};
use crate::zkp::{ShippingProver, ZkProof};

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

/// A requester's ask, countersigned by the address holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingValidationRequest {
    pub pid: Pid,
    /// Holder's signature over [`consent_message`](Self::consent_message).
    pub user_signature: VeySignature,
    pub conditions: ShippingCondition,
    pub requester_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub parcel: Option<ParcelInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Consent<'a> {
    pid: &'a Pid,
    conditions: &'a ShippingCondition,
    requester_id: &'a str,
    timestamp: &'a DateTime<Utc>,
}

impl ShippingValidationRequest {
    /// Build a request and sign it with the holder's key.
    pub fn signed(
        holder: &VeyKeypair,
        pid: Pid,
        conditions: ShippingCondition,
        requester_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        parcel: Option<ParcelInfo>,
    ) -> Result<Self, SignatureError> {
        let requester_id = requester_id.into();
        let message = consent_message(&pid, &conditions, &requester_id, &timestamp)?;
        Ok(Self {
            user_signature: holder.sign(&message),
            pid,
            conditions,
            requester_id,
            timestamp,
            parcel,
        })
    }

    /// The exact bytes the holder signs.
    pub fn consent_message(&self) -> Result<Vec<u8>, SignatureError> {
        consent_message(&self.pid, &self.conditions, &self.requester_id, &self.timestamp)
    }
}

fn consent_message(
    pid: &Pid,
    conditions: &ShippingCondition,
    requester_id: &str,
    timestamp: &DateTime<Utc>,
) -> Result<Vec<u8>, SignatureError> {
    tagged_message(
        SHIPPING_CONSENT_TAG,
        &Consent {
            pid,
            conditions,
            requester_id,
            timestamp,
        },
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingValidationResponse {
    pub valid: bool,
    #[serde(default)]
    pub zk_proof: Option<ZkProof>,
    #[serde(default)]
    pub pid_token: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Where a validation run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Received,
    AddressResolved,
    ConditionEvaluated,
    ProofGenerated,
    Rejected,
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationState::Received => "received",
            ValidationState::AddressResolved => "address_resolved",
            ValidationState::ConditionEvaluated => "condition_evaluated",
            ValidationState::ProofGenerated => "proof_generated",
            ValidationState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// `hex(BLAKE3_keyed(secret, "pid-token:v1" || pid || 0x00 || requester_id))`.
///
/// Stable per (PID, requester) pair, unlinkable across requesters.
pub fn pid_token(secret: &[u8; 32], pid: &Pid, requester_id: &str) -> String {
    hex::encode(keyed_hash(
        secret,
        &[DOMAIN_PID_TOKEN, pid.as_bytes(), &[0x00], requester_id.as_bytes()],
    ))
}

// ---------------------------------------------------------------------------
// ShippingValidator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ShippingValidator {
    vault: AddressVault,
    credentials: CredentialStore,
    revocations: RevocationRegistry,
    issuer_key: VeyPublicKey,
    prover: Arc<ShippingProver>,
    token_secret: [u8; 32],
}

impl fmt::Debug for ShippingValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShippingValidator")
            .field("issuer_key", &self.issuer_key)
            .field("prover", &self.prover)
            .finish_non_exhaustive()
    }
}

impl ShippingValidator {
    pub fn new(
        vault: AddressVault,
        credentials: CredentialStore,
        revocations: RevocationRegistry,
        issuer_key: VeyPublicKey,
        prover: Arc<ShippingProver>,
        token_secret: [u8; 32],
    ) -> Self {
        Self {
            vault,
            credentials,
            revocations,
            issuer_key,
            prover,
            token_secret,
        }
    }

    pub fn prover(&self) -> &ShippingProver {
        &self.prover
    }

    /// Outward entry point: never errors, never says more than a generic
    /// reason.
    pub fn handle(&self, request: &ShippingValidationRequest) -> ShippingValidationResponse {
        let now = Utc::now();
        match self.validate(request, now) {
            Ok(response) => response,
            Err(e) => ShippingValidationResponse {
                valid: false,
                zk_proof: None,
                pid_token: None,
                error: Some(e.public_message().to_string()),
                timestamp: now,
            },
        }
    }

    /// Run the state machine at `now`.
    pub fn validate(
        &self,
        request: &ShippingValidationRequest,
        now: DateTime<Utc>,
    ) -> Result<ShippingValidationResponse, ShippingError> {
        let mut state = ValidationState::Received;
        let result = self.run(request, now, &mut state);
        match &result {
            Ok(_) => info!(
                pid = %request.pid,
                requester = %request.requester_id,
                %state,
                "shipping validation succeeded"
            ),
            Err(e) => warn!(
                pid = %request.pid,
                requester = %request.requester_id,
                %state,
                error = %e,
                "shipping validation rejected"
            ),
        }
        result
    }

    fn run(
        &self,
        request: &ShippingValidationRequest,
        now: DateTime<Utc>,
        state: &mut ValidationState,
    ) -> Result<ShippingValidationResponse, ShippingError> {
        // -- Received --------------------------------------------------------
        check_timestamp(request.timestamp, now)?;
        request
            .conditions
            .validate()
            .map_err(|e| ShippingError::Validation(e.to_string()))?;
        let parcel = match request.parcel {
            Some(parcel) => parcel
                .measure()
                .map_err(|e| ShippingError::Validation(e.to_string()))?,
            None if request.conditions.needs_parcel() => {
                return Err(ShippingError::Validation(
                    "parcel required for weight or size limits".into(),
                ))
            }
            None => Default::default(),
        };

        let credential = self
            .credentials
            .get(&request.pid)?
            .ok_or(ShippingError::UnknownPid)?;
        CredentialIssuer::check(&credential, &self.issuer_key, now)?;
        let holder = VeyDid::parse(&credential.did).map_err(crate::credential::CredentialError::from)?;
        let message = request.consent_message()?;
        if !holder.public_key().verify(&message, &request.user_signature) {
            return Err(ShippingError::SignatureInvalid);
        }
        debug!(pid = %request.pid, "consent signature verified");

        // -- AddressResolved -------------------------------------------------
        let address = match self.vault.open(&request.pid) {
            Ok(address) => address,
            Err(VaultError::UnknownPid) => return Err(ShippingError::UnknownPid),
            Err(e) => return Err(ShippingError::Vault(e)),
        };
        if self.revocations.is_revoked(request.pid.as_str(), None)?
            || self.revocations.is_revoked(&credential.id, None)?
        {
            return Err(ShippingError::Revoked);
        }
        *state = ValidationState::AddressResolved;

        // -- ConditionEvaluated ----------------------------------------------
        let satisfied = request
            .conditions
            .evaluate(&address, &parcel)
            .map_err(|e| ShippingError::Validation(e.to_string()))?;
        if !satisfied {
            *state = ValidationState::Rejected;
            return Err(ShippingError::ConditionsNotMet);
        }
        *state = ValidationState::ConditionEvaluated;

        // -- ProofGenerated --------------------------------------------------
        let proof = self.prover.prove(
            &request.pid,
            &address,
            &request.conditions,
            &parcel,
            Some(&request.requester_id),
        )?;
        *state = ValidationState::ProofGenerated;

        Ok(ShippingValidationResponse {
            valid: true,
            zk_proof: Some(proof),
            pid_token: Some(pid_token(&self.token_secret, &request.pid, &request.requester_id)),
            error: None,
            timestamp: now,
        })
    }
}

fn check_timestamp(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), ShippingError> {
    let max_age = Duration::from_std(MAX_REQUEST_AGE).unwrap_or_else(|_| Duration::minutes(5));
    let skew = Duration::from_std(MAX_CLOCK_SKEW).unwrap_or_else(|_| Duration::seconds(30));
    if now - timestamp > max_age {
        return Err(ShippingError::Validation("request expired".into()));
    }
    if timestamp - now > skew {
        return Err(ShippingError::Validation("request timestamp in the future".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
