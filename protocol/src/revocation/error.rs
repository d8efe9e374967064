//! Error types for the revocation registry and its consumers.

use thiserror::Error;

use crate::crypto::signatures::SignatureError;
use crate::storage::DbError;

/// Errors from publishing, caching or consulting a revocation list.
#[derive(Debug, Error)]
pub enum RevocationError {
    /// The id already has an entry. Versions are never spent on duplicates.
    #[error("{0} is already revoked")]
    AlreadyRevoked(String),

    /// The id appears in the list the caller checked against.
    #[error("{id} was revoked at version {version}")]
    Revoked {
        /// PID or credential id.
        id: String,
        /// List version that carries the entry.
        version: u64,
    },

    /// The cached list is too old to be trusted. Refetch, then retry.
    #[error("revocation list is stale: {age_secs}s old (max {max_secs}s)")]
    Stale {
        /// Age of the cached list in seconds.
        age_secs: i64,
        /// Configured maximum staleness in seconds.
        max_secs: i64,
    },

    /// A fetched list is older than the one already cached.
    #[error("revocation list rollback: cached version {cached}, offered {offered}")]
    VersionRollback {
        /// Version currently cached.
        cached: u64,
        /// Version that was offered.
        offered: u64,
    },

    /// The list signature or Merkle root did not verify.
    #[error("revocation list signature invalid")]
    BadSignature,

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}
