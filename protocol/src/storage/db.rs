//! # VeyDB: Persistent Storage Engine
//!
//! The persistence layer for every VEY store, built on sled's embedded
//! key-value engine. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree               | Key                                 | Value                      |
//! |--------------------|-------------------------------------|----------------------------|
//! | `addresses`        | PID (UTF-8)                         | `bincode(AddressRecord)`   |
//! | `dids`             | DID (UTF-8)                         | `bincode(StoredDid)`       |
//! | `credentials`      | PID (UTF-8)                         | `bincode(AddressCredential)` |
//! | `revocations`      | `version` (8B BE)                   | `bincode(RevocationEntry)` |
//! | `revocation_index` | subject id (UTF-8)                  | `version` (8B BE)          |
//! | `audit`            | `pid 0x00 ts(8B BE) seq(8B BE)`     | `bincode(AuditLogEntry)`   |
//! | `waybills`         | waybill id (UTF-8)                  | `bincode(ZkpWaybill)`      |
//! | `tracking`         | `waybill 0x00 ts(8B BE) seq(8B BE)` | `bincode(TrackingEvent)`   |
//! | `tracking_heads`   | waybill id (UTF-8)                  | `ts(8B BE) seq(8B BE)`     |
//! | `metadata`         | key (UTF-8)                         | value (bytes)              |
//!
//! Numeric key parts are big-endian so sled's lexicographic order matches
//! numeric order, and range scans over a subject's history come back in
//! time order.
//!
//! ## Atomicity
//!
//! Stores that must be linearizable (revocation appends, tracking appends)
//! run sled multi-tree transactions over the trees they touch. sled retries
//! the closure on conflict, which gives us compare-and-append on the
//! version counter without a process-wide lock.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::path::Path;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// bincode-encode a value for storage.
pub fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

/// bincode-decode a stored value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Big-endian u64, the key encoding for versions and timestamps.
pub fn be_u64(bytes: &[u8]) -> DbResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("expected 8-byte big-endian integer".into()))?;
    Ok(u64::from_be_bytes(arr))
}

/// `subject || 0x00 || ts(BE) || seq(BE)`: the key of an append-only,
/// per-subject log entry. The separator keeps `ab` from prefixing `abc`.
pub fn log_key(subject: &str, timestamp_ms: u64, seq: u64) -> Vec<u8> {
    let mut key = log_prefix(subject);
    key.extend_from_slice(&timestamp_ms.to_be_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

/// Prefix shared by every [`log_key`] of `subject`.
pub fn log_prefix(subject: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(subject.len() + 17);
    key.extend_from_slice(subject.as_bytes());
    key.push(0x00);
    key
}

// ---------------------------------------------------------------------------
// VeyDB
// ---------------------------------------------------------------------------

/// Persistent storage engine.
///
/// Cloning is cheap (sled handles are reference counted), and every store
/// in the crate holds its own clone.
#[derive(Debug, Clone)]
pub struct VeyDB {
    db: Db,
    addresses: Tree,
    dids: Tree,
    credentials: Tree,
    revocations: Tree,
    revocation_index: Tree,
    audit: Tree,
    waybills: Tree,
    tracking: Tree,
    tracking_heads: Tree,
    metadata: Tree,
}

impl VeyDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A database that lives in a temporary location and is removed on drop.
    /// Meant for tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        Ok(Self {
            addresses: db.open_tree("addresses")?,
            dids: db.open_tree("dids")?,
            credentials: db.open_tree("credentials")?,
            revocations: db.open_tree("revocations")?,
            revocation_index: db.open_tree("revocation_index")?,
            audit: db.open_tree("audit")?,
            waybills: db.open_tree("waybills")?,
            tracking: db.open_tree("tracking")?,
            tracking_heads: db.open_tree("tracking_heads")?,
            metadata: db.open_tree("metadata")?,
            db,
        })
    }

    /// Open an additional named tree in the same database.
    pub fn open_tree(&self, name: &str) -> DbResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    pub fn addresses(&self) -> &Tree {
        &self.addresses
    }

    pub fn dids(&self) -> &Tree {
        &self.dids
    }

    pub fn credentials(&self) -> &Tree {
        &self.credentials
    }

    pub fn revocations(&self) -> &Tree {
        &self.revocations
    }

    pub fn revocation_index(&self) -> &Tree {
        &self.revocation_index
    }

    pub fn audit(&self) -> &Tree {
        &self.audit
    }

    pub fn waybills(&self) -> &Tree {
        &self.waybills
    }

    pub fn tracking(&self) -> &Tree {
        &self.tracking
    }

    pub fn tracking_heads(&self) -> &Tree {
        &self.tracking_heads
    }

    pub fn metadata(&self) -> &Tree {
        &self.metadata
    }

    // -- Typed access -------------------------------------------------------

    /// Store a bincode-encoded value.
    pub fn put<T: Serialize>(&self, tree: &Tree, key: &[u8], value: &T) -> DbResult<()> {
        tree.insert(key, encode(value)?)?;
        Ok(())
    }

    /// Load and decode a value. `None` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, tree: &Tree, key: &[u8]) -> DbResult<Option<T>> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Decode every value under `prefix`, in key order.
    pub fn scan_prefix<T: DeserializeOwned>(&self, tree: &Tree, prefix: &[u8]) -> DbResult<Vec<T>> {
        tree.scan_prefix(prefix)
            .map(|entry| {
                let (_key, value) = entry?;
                decode(&value)
            })
            .collect()
    }

    // -- Metadata -----------------------------------------------------------

    pub fn get_meta(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.metadata.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    pub fn put_meta(&self, key: &str, value: &[u8]) -> DbResult<()> {
        self.metadata.insert(key.as_bytes(), value)?;
        Ok(())
    }

    // -- Utility ------------------------------------------------------------

    /// Monotonic id from sled. Unique across restarts.
    pub fn generate_id(&self) -> DbResult<u64> {
        Ok(self.db.generate_id()?)
    }

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Row counts for the node's status endpoint.
    pub fn stats(&self) -> DbStats {
        DbStats {
            addresses: self.addresses.len(),
            credentials: self.credentials.len(),
            revocations: self.revocations.len(),
            waybills: self.waybills.len(),
            audit_entries: self.audit.len(),
        }
    }
}

/// Row counts per tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DbStats {
    pub addresses: usize,
    pub credentials: usize,
    pub revocations: usize,
    pub waybills: usize,
    pub audit_entries: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
