//! # Address Credentials
//!
//! A credential is the issuer's signed statement "DID `d` holds PID `p`
//! from `issuedAt` until `expiresAt`". The shipping validator uses it to
//! find the key a consent signature must verify against.
//!
//! The signature is Ed25519 over the canonical JSON of every field except
//! `signature`, prefixed with a domain tag.

pub mod address;
pub mod issuer;
pub mod store;

pub use address::{AddressCredential, CREDENTIAL_TYPE};
pub use issuer::CredentialIssuer;
pub use store::CredentialStore;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::config::DEFAULT_CREDENTIAL_TTL;
use crate::crypto::signatures::SignatureError;
use crate::identity::DidError;
use crate::revocation::RevocationError;
use crate::storage::DbError;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("credential not valid before {issued_at}")]
    NotYetValid { issued_at: DateTime<Utc> },

    #[error("credential signature invalid")]
    BadSignature,

    #[error("credential was not issued by this key")]
    IssuerMismatch,

    #[error("credential lifetime must be positive")]
    InvalidTtl,

    #[error(transparent)]
    Did(#[from] DidError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Revocation(#[from] RevocationError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

/// [`DEFAULT_CREDENTIAL_TTL`] as a chrono duration.
pub fn default_ttl() -> Duration {
    Duration::from_std(DEFAULT_CREDENTIAL_TTL).unwrap_or_else(|_| Duration::days(365))
}
