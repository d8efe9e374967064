//! The revocation registry: sole writer of revocation list versions.
//!
//! Each `revoke` is one sled transaction over three trees:
//!
//! ```text
//! metadata["revocation_version"]  n      -> n + 1
//! revocations[n + 1 (BE)]                <- entry
//! revocation_index[id]                   <- n + 1 (BE)
//! ```
//!
//! sled re-runs the closure when another writer commits first. That makes
//! the version bump a compare-and-append: two concurrent revocations always
//! land on distinct, consecutive versions, and a duplicate id aborts
//! without consuming a version.

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::{debug, info};

use super::list::{RevocationEntry, RevocationList, RevocationReason, RevocationSubject};
use super::RevocationError;
use crate::crypto::keys::{VeyKeypair, VeyPublicKey};
use crate::identity::VeyDid;
use crate::pid::Pid;
use crate::storage::db::{be_u64, decode, encode};
use crate::storage::{DbError, VeyDB};

const META_VERSION: &[u8] = b"revocation_version";

#[derive(Debug, Clone)]
pub struct RevocationRegistry {
    db: VeyDB,
    keypair: VeyKeypair,
    issuer: String,
}

impl RevocationRegistry {
    pub fn new(db: VeyDB, keypair: VeyKeypair) -> Self {
        let issuer = VeyDid::from_public_key(&keypair.public_key()).to_did_string();
        Self { db, keypair, issuer }
    }

    /// DID of the registry signing key.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn public_key(&self) -> VeyPublicKey {
        self.keypair.public_key()
    }

    /// Append an entry. Always produces a new, higher version.
    pub fn revoke(
        &self,
        subject: RevocationSubject,
        reason: RevocationReason,
    ) -> Result<RevocationEntry, RevocationError> {
        let id = subject.id().to_string();
        let trees = (
            self.db.metadata(),
            self.db.revocations(),
            self.db.revocation_index(),
        );

        let entry = trees
            .transaction(|(meta, log, index)| {
                if index.get(id.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        RevocationError::AlreadyRevoked(id.clone()),
                    ));
                }
                let current = match meta.get(META_VERSION)? {
                    Some(bytes) => be_u64(&bytes).map_err(abort)?,
                    None => 0,
                };
                let version = current + 1;
                let entry = RevocationEntry {
                    version,
                    subject: subject.clone(),
                    reason: reason.clone(),
                    revoked_at: Utc::now(),
                };
                let version_key = version.to_be_bytes();
                log.insert(&version_key, encode(&entry).map_err(abort)?)?;
                index.insert(id.as_bytes(), &version_key)?;
                meta.insert(META_VERSION, &version_key)?;
                Ok(entry)
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => RevocationError::Storage(DbError::Sled(e)),
            })?;

        self.db.flush()?;
        info!(
            version = entry.version,
            subject = %entry.subject.id(),
            reason = ?entry.reason,
            "revocation appended"
        );
        Ok(entry)
    }

    /// Shorthand for revoking a PID.
    pub fn revoke_pid(
        &self,
        pid: &Pid,
        reason: RevocationReason,
    ) -> Result<RevocationEntry, RevocationError> {
        self.revoke(RevocationSubject::Pid(pid.clone()), reason)
    }

    /// Current list version (0 before the first revocation).
    pub fn version(&self) -> Result<u64, RevocationError> {
        match self.db.get_meta("revocation_version")? {
            Some(bytes) => Ok(be_u64(&bytes)?),
            None => Ok(0),
        }
    }

    /// Is `id` revoked in list version `as_of` (or the latest, if `None`)?
    pub fn is_revoked(&self, id: &str, as_of: Option<u64>) -> Result<bool, RevocationError> {
        let version = match self.db.revocation_index().get(id.as_bytes()).map_err(DbError::from)? {
            Some(bytes) => be_u64(&bytes)?,
            None => return Ok(false),
        };
        Ok(as_of.map_or(true, |v| version <= v))
    }

    /// The entry revoking `id`, if any.
    pub fn entry_for(&self, id: &str) -> Result<Option<RevocationEntry>, RevocationError> {
        let Some(version) = self.db.revocation_index().get(id.as_bytes()).map_err(DbError::from)?
        else {
            return Ok(None);
        };
        Ok(self.db.get(self.db.revocations(), &version)?)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Result<Vec<RevocationEntry>, RevocationError> {
        self.entries_since(0)
    }

    /// Entries with a version strictly greater than `version`.
    pub fn entries_since(&self, version: u64) -> Result<Vec<RevocationEntry>, RevocationError> {
        let start = version.saturating_add(1).to_be_bytes();
        self.db
            .revocations()
            .range(start..)
            .map(|row| {
                let (_key, value) = row.map_err(DbError::from)?;
                Ok(decode(&value)?)
            })
            .collect()
    }

    /// Follow `AddressChange` entries from `pid` to the newest PID.
    /// `None` when `pid` was never moved.
    pub fn successor(&self, pid: &Pid) -> Result<Option<Pid>, RevocationError> {
        let mut current = pid.clone();
        let mut moved = false;
        // Every hop consumes a distinct entry, so the chain is bounded.
        for _ in 0..=self.db.revocations().len() {
            match self.entry_for(current.as_str())? {
                Some(RevocationEntry {
                    reason: RevocationReason::AddressChange { new_pid },
                    ..
                }) => {
                    current = new_pid;
                    moved = true;
                }
                _ => break,
            }
        }
        debug!(from = %pid, moved, "resolved PID successor");
        Ok(moved.then_some(current))
    }

    /// Sign and return the full current list.
    pub fn publish(&self) -> Result<RevocationList, RevocationError> {
        RevocationList::sign(&self.keypair, self.issuer.clone(), Utc::now(), self.entries()?)
    }
}

fn abort(e: DbError) -> ConflictableTransactionError<RevocationError> {
    ConflictableTransactionError::Abort(RevocationError::Storage(e))
}
