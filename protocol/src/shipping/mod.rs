//! # Shipping Module: Conditions, Validation, Waybills, Tracking
//!
//! Everything between "a shop wants to ship to this PID" and "the parcel
//! was delivered", without the shop ever learning the address.
//!
//! ## Architecture
//!
//! ```text
//! condition.rs  - ShippingCondition, ParcelInfo, native predicate evaluation
//! validator.rs  - ShippingValidator: consent check → vault → proof → pidToken
//! waybill.rs    - WaybillBook (proof-gated waybills) and TrackingLog
//! payload.rs    - TransportPayload, the closed set of QR/NFC payloads
//! ```
//!
//! ## Flow
//!
//! ```text
//! shop ── ShippingValidationRequest (holder-signed) ──► ShippingValidator
//!                                                            │
//! shop ◄──────────── ZkProof + pidToken ─────────────────────┘
//!   │
//!   └── WaybillBook::create (verify first) ──► TrackingLog::append ...
//! ```

pub mod condition;
pub mod payload;
pub mod validator;
pub mod waybill;

pub use condition::{Dimensions, LengthUnit, ParcelInfo, ShippingCondition};
pub use payload::TransportPayload;
pub use validator::{
    pid_token, ShippingValidationRequest, ShippingValidationResponse, ShippingValidator,
    ValidationState,
};
pub use waybill::{
    CarrierInfo, RecipientInfo, SenderInfo, TrackingEvent, TrackingLocation, TrackingLog,
    TrackingStatus, TrackingUpdate, WaybillBook, WaybillRequest, ZkpWaybill,
};

use thiserror::Error;

use crate::credential::CredentialError;
use crate::crypto::signatures::SignatureError;
use crate::revocation::RevocationError;
use crate::storage::DbError;
use crate::vault::VaultError;
use crate::zkp::ZkpError;

#[derive(Debug, Error)]
pub enum ShippingError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("consent signature invalid")]
    SignatureInvalid,

    #[error("credential rejected: {0}")]
    Credential(#[from] CredentialError),

    #[error("unknown PID")]
    UnknownPid,

    #[error("PID revoked")]
    Revoked,

    #[error("conditions not met")]
    ConditionsNotMet,

    #[error("proof error: {0}")]
    Proof(#[from] ZkpError),

    #[error("waybill PID does not match the proof")]
    PidMismatch,

    #[error("vault error: {0}")]
    Vault(VaultError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Revocation(#[from] RevocationError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl ShippingError {
    /// What a remote caller is told. Never names the failing predicate.
    pub fn public_message(&self) -> &'static str {
        match self {
            ShippingError::Validation(_) | ShippingError::Signature(_) => "invalid request",
            ShippingError::SignatureInvalid | ShippingError::Credential(_) => {
                "authentication failed"
            }
            ShippingError::UnknownPid => "unknown PID",
            ShippingError::Revoked => "PID revoked",
            ShippingError::ConditionsNotMet => "conditions not met",
            ShippingError::Proof(ZkpError::Unsatisfied) => "conditions not met",
            ShippingError::Proof(ZkpError::Revocation(_)) | ShippingError::Revocation(_) => {
                "revocation check failed"
            }
            ShippingError::Proof(_) | ShippingError::PidMismatch => "proof rejected",
            ShippingError::Tracking(_)
            | ShippingError::Vault(_)
            | ShippingError::Storage(_) => "internal error",
        }
    }
}

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("unknown waybill: {0}")]
    UnknownWaybill(String),

    #[error("event at {offered_ms} ms precedes the last event at {last_ms} ms")]
    OutOfOrderEvent { last_ms: u64, offered_ms: u64 },

    #[error("event timestamp before the Unix epoch")]
    InvalidTimestamp,

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}
