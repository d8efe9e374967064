//! Crate-wide error taxonomy.
//!
//! Every module keeps its own precise error enum. [`VeyError`] folds them
//! into the handful of classes a caller can act on, each with a stable
//! string code for wire responses.

use thiserror::Error;

use crate::credential::CredentialError;
use crate::crypto::encryption::EncryptionError;
use crate::crypto::keys::KeyError;
use crate::crypto::signatures::SignatureError;
use crate::identity::{DidError, RequestAuthError};
use crate::pid::PidError;
use crate::resolver::{AuditError, ResolveError};
use crate::revocation::RevocationError;
use crate::shipping::condition::ConditionError;
use crate::shipping::{ShippingError, TrackingError};
use crate::storage::DbError;
use crate::vault::VaultError;
use crate::zkp::ZkpError;

pub type Result<T> = std::result::Result<T, VeyError>;

#[derive(Debug, Error)]
pub enum VeyError {
    /// Malformed or incomplete address or request. Caller fixes the input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Signature or credential invalid or expired. Caller re-authenticates.
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("access denied: {0}")]
    Denied(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// PID or credential revoked. Fatal until a fresh PID is issued.
    #[error("revoked: {0}")]
    Revoked(String),

    /// Business rejection. The message never names the failing predicate.
    #[error("conditions not met")]
    ConditionNotMet,

    #[error("proof verification failed: {0}")]
    ProofVerification(String),

    #[error("audit write failed: {0}")]
    AuditWriteFailure(String),

    /// Cached revocation list too old. Refetch and retry.
    #[error("revocation list stale: {0}")]
    StaleRevocationList(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VeyError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            VeyError::Validation(_) => "VALIDATION_ERROR",
            VeyError::Authentication(_) => "AUTHENTICATION_ERROR",
            VeyError::Denied(_) => "ACCESS_DENIED",
            VeyError::NotFound(_) => "NOT_FOUND",
            VeyError::Revoked(_) => "REVOKED",
            VeyError::ConditionNotMet => "CONDITION_NOT_MET",
            VeyError::ProofVerification(_) => "PROOF_VERIFICATION_ERROR",
            VeyError::AuditWriteFailure(_) => "AUDIT_WRITE_FAILURE",
            VeyError::StaleRevocationList(_) => "STALE_REVOCATION_LIST",
            VeyError::Storage(_) => "STORAGE_ERROR",
            VeyError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same call can succeed without caller changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VeyError::StaleRevocationList(_) | VeyError::Storage(_))
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<DbError> for VeyError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Sled(_) => VeyError::Storage(e.to_string()),
            DbError::NotFound(_) => VeyError::NotFound(e.to_string()),
            // A record that no longer decodes will not decode on retry either.
            DbError::Serialization(_) => VeyError::Internal(e.to_string()),
        }
    }
}

impl From<PidError> for VeyError {
    fn from(e: PidError) -> Self {
        VeyError::Validation(e.to_string())
    }
}

impl From<ConditionError> for VeyError {
    fn from(e: ConditionError) -> Self {
        VeyError::Validation(e.to_string())
    }
}

impl From<KeyError> for VeyError {
    fn from(e: KeyError) -> Self {
        VeyError::Validation(e.to_string())
    }
}

impl From<SignatureError> for VeyError {
    fn from(e: SignatureError) -> Self {
        match e {
            SignatureError::VerificationFailed => VeyError::Authentication(e.to_string()),
            SignatureError::Canonicalization(_) => VeyError::Internal(e.to_string()),
        }
    }
}

impl From<EncryptionError> for VeyError {
    fn from(e: EncryptionError) -> Self {
        VeyError::Internal(e.to_string())
    }
}

impl From<DidError> for VeyError {
    fn from(e: DidError) -> Self {
        match e {
            DidError::NotFound(_) => VeyError::NotFound(e.to_string()),
            DidError::Storage(e) => e.into(),
            DidError::InvalidFormat(_)
            | DidError::UnsupportedMethod(_)
            | DidError::InvalidKey
            | DidError::Conflict(_)
            | DidError::Serialization(_) => VeyError::Validation(e.to_string()),
        }
    }
}

impl From<RequestAuthError> for VeyError {
    fn from(e: RequestAuthError) -> Self {
        match e {
            RequestAuthError::Canonicalization(_) => VeyError::Internal(e.to_string()),
            RequestAuthError::Signer(_)
            | RequestAuthError::BadSignature
            | RequestAuthError::Expired
            | RequestAuthError::FromTheFuture => VeyError::Authentication(e.to_string()),
        }
    }
}

impl From<CredentialError> for VeyError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::Did(e) => e.into(),
            CredentialError::Revocation(e) => e.into(),
            CredentialError::Storage(e) => e.into(),
            CredentialError::InvalidTtl => VeyError::Validation(e.to_string()),
            CredentialError::Signature(SignatureError::Canonicalization(_)) => {
                VeyError::Internal(e.to_string())
            }
            CredentialError::Expired { .. }
            | CredentialError::NotYetValid { .. }
            | CredentialError::BadSignature
            | CredentialError::IssuerMismatch
            | CredentialError::Signature(_) => VeyError::Authentication(e.to_string()),
        }
    }
}

impl From<RevocationError> for VeyError {
    fn from(e: RevocationError) -> Self {
        match e {
            RevocationError::AlreadyRevoked(_) | RevocationError::Revoked { .. } => {
                VeyError::Revoked(e.to_string())
            }
            RevocationError::Stale { .. } => VeyError::StaleRevocationList(e.to_string()),
            RevocationError::Storage(e) => e.into(),
            RevocationError::VersionRollback { .. }
            | RevocationError::BadSignature
            | RevocationError::Signature(_) => VeyError::Authentication(e.to_string()),
        }
    }
}

impl From<VaultError> for VeyError {
    fn from(e: VaultError) -> Self {
        match e {
            VaultError::UnknownPid => VeyError::NotFound(e.to_string()),
            VaultError::Pid(e) => e.into(),
            VaultError::Storage(e) => e.into(),
            VaultError::CollisionSpaceExhausted | VaultError::Encryption(_) => {
                VeyError::Internal(e.to_string())
            }
        }
    }
}

impl From<ZkpError> for VeyError {
    fn from(e: ZkpError) -> Self {
        match e {
            ZkpError::Unsatisfied => VeyError::ConditionNotMet,
            ZkpError::Pid(e) => e.into(),
            ZkpError::Condition(e) => e.into(),
            ZkpError::Revocation(e) => e.into(),
            ZkpError::AddressMismatch => VeyError::Internal(e.to_string()),
            ZkpError::Storage(e) => e.into(),
            ZkpError::Synthesis(_) => VeyError::Internal(e.to_string()),
            ZkpError::CircuitMismatch { .. }
            | ZkpError::UnsupportedProofType(_)
            | ZkpError::ParamsHashMismatch
            | ZkpError::ConditionMismatch
            | ZkpError::DigestMismatch
            | ZkpError::PidOutsideConditions
            | ZkpError::InvalidProof
            | ZkpError::Malformed(_) => VeyError::ProofVerification(e.to_string()),
        }
    }
}

impl From<ShippingError> for VeyError {
    fn from(e: ShippingError) -> Self {
        match e {
            ShippingError::Validation(_) => VeyError::Validation(e.to_string()),
            ShippingError::SignatureInvalid => VeyError::Authentication(e.to_string()),
            ShippingError::Credential(e) => e.into(),
            ShippingError::UnknownPid => VeyError::NotFound(e.to_string()),
            ShippingError::Revoked => VeyError::Revoked(e.to_string()),
            ShippingError::ConditionsNotMet => VeyError::ConditionNotMet,
            ShippingError::Proof(e) => e.into(),
            ShippingError::PidMismatch => VeyError::ProofVerification(e.to_string()),
            ShippingError::Vault(e) => e.into(),
            ShippingError::Signature(e) => e.into(),
            ShippingError::Revocation(e) => e.into(),
            ShippingError::Tracking(e) => e.into(),
            ShippingError::Storage(e) => e.into(),
        }
    }
}

impl From<TrackingError> for VeyError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::UnknownWaybill(_) => VeyError::NotFound(e.to_string()),
            TrackingError::OutOfOrderEvent { .. } | TrackingError::InvalidTimestamp => {
                VeyError::Validation(e.to_string())
            }
            TrackingError::Storage(e) => e.into(),
        }
    }
}

impl From<AuditError> for VeyError {
    fn from(e: AuditError) -> Self {
        VeyError::AuditWriteFailure(e.to_string())
    }
}

impl From<ResolveError> for VeyError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Denied => VeyError::Denied(e.to_string()),
            ResolveError::Revoked => VeyError::Revoked(e.to_string()),
            ResolveError::UnknownPid => VeyError::NotFound(e.to_string()),
            ResolveError::AuditWriteFailure(e) => e.into(),
            ResolveError::Vault(e) => e.into(),
            ResolveError::Revocation(e) => e.into(),
            ResolveError::Tracking(e) => e.into(),
            ResolveError::Storage(e) => e.into(),
        }
    }
}
