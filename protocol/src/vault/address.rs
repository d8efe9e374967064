use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{AES_KEY_LENGTH, MAX_COLLISION_SUFFIX};
use crate::crypto::encryption::{self, EncryptionError};
use crate::pid::{encode_with_collision, NormalizedAddress, Pid, PidError, Precision};
use crate::storage::db::{decode, encode};
use crate::storage::{DbError, VeyDB};

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no address record for PID")]
    UnknownPid,

    #[error("all collision suffixes for this PID are taken")]
    CollisionSpaceExhausted,

    #[error(transparent)]
    Pid(#[from] PidError),

    #[error("address record could not be opened: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

/// One row of the `addresses` tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRecord {
    pub pid: Pid,
    pub owner_did: String,
    /// `nonce || ciphertext` of the bincode-encoded full address.
    pub sealed: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Sealed PID → address store.
#[derive(Clone)]
pub struct AddressVault {
    db: VeyDB,
    key: [u8; AES_KEY_LENGTH],
}

impl std::fmt::Debug for AddressVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressVault").finish_non_exhaustive()
    }
}

impl AddressVault {
    pub fn new(db: VeyDB, key: [u8; AES_KEY_LENGTH]) -> Self {
        Self { db, key }
    }

    /// Register `address` for `owner_did` and return its PID.
    ///
    /// The base PID is used unless a *different* address or owner already
    /// holds it, in which case the first free suffix `C01..C99` is taken.
    /// Registering the same address for the same owner again returns the
    /// PID it already has.
    ///
    /// A revoked PID is never handed out again, not even to its previous
    /// holder: its slot counts as taken and the next suffix is tried.
    pub fn register(
        &self,
        address: &NormalizedAddress,
        owner_did: &str,
        precision: Precision,
    ) -> Result<Pid, VaultError> {
        address.validate()?;

        let candidates = std::iter::once(None).chain((1..=MAX_COLLISION_SUFFIX).map(Some));
        for collision in candidates {
            let pid = encode_with_collision(address, precision, collision)?;
            if self.is_retired(&pid)? {
                debug!(%pid, "skipping revoked PID");
                continue;
            }
            loop {
                match self.record(&pid)? {
                    Some(existing) => {
                        if existing.owner_did == owner_did && self.unseal(&existing)? == *address {
                            debug!(%pid, "address already registered");
                            return Ok(pid);
                        }
                        break;
                    }
                    None => {
                        let record = AddressRecord {
                            pid: pid.clone(),
                            owner_did: owner_did.to_string(),
                            sealed: encryption::seal(&self.key, &encode(address)?, pid.as_bytes())?,
                            created_at: Utc::now(),
                        };
                        let swapped = self
                            .db
                            .addresses()
                            .compare_and_swap(
                                pid.as_bytes(),
                                None as Option<&[u8]>,
                                Some(encode(&record)?),
                            )
                            .map_err(DbError::from)?;
                        if swapped.is_ok() {
                            self.db.flush()?;
                            info!(%pid, collision = collision.unwrap_or(0), "registered address");
                            return Ok(pid);
                        }
                        // Lost a race for this slot: re-read it.
                    }
                }
            }
        }
        Err(VaultError::CollisionSpaceExhausted)
    }

    /// Decrypt the full address behind `pid`. Callers outside the crate go
    /// through the resolver, which enforces policy and audit first.
    pub fn open(&self, pid: &Pid) -> Result<NormalizedAddress, VaultError> {
        let record = self.record(pid)?.ok_or(VaultError::UnknownPid)?;
        self.unseal(&record)
    }

    pub fn owner(&self, pid: &Pid) -> Result<Option<String>, VaultError> {
        Ok(self.record(pid)?.map(|r| r.owner_did))
    }

    pub fn contains(&self, pid: &Pid) -> Result<bool, VaultError> {
        Ok(self
            .db
            .addresses()
            .contains_key(pid.as_bytes())
            .map_err(DbError::from)?)
    }

    /// Whether the revocation registry sharing this database lists `pid`.
    fn is_retired(&self, pid: &Pid) -> Result<bool, VaultError> {
        Ok(self
            .db
            .revocation_index()
            .contains_key(pid.as_bytes())
            .map_err(DbError::from)?)
    }

    fn record(&self, pid: &Pid) -> Result<Option<AddressRecord>, VaultError> {
        Ok(self.db.get(self.db.addresses(), pid.as_bytes())?)
    }

    fn unseal(&self, record: &AddressRecord) -> Result<NormalizedAddress, VaultError> {
        let plain = encryption::open(&self.key, &record.sealed, record.pid.as_bytes())?;
        Ok(decode(&plain)?)
    }
}
