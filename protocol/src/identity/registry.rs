//! Persistent DID → document map.
//!
//! One document per holder. Registering the same document again is a
//! no-op; registering a *different* document under an existing DID is
//! refused, since rotation is modeled as a brand-new DID.

use tracing::{debug, info};

use super::did::{DidDocument, DidError, VeyDid};
use crate::crypto::keys::VeyPublicKey;
use crate::storage::VeyDB;

#[derive(Debug, Clone)]
pub struct DidRegistry {
    db: VeyDB,
}

impl DidRegistry {
    pub fn new(db: VeyDB) -> Self {
        Self { db }
    }

    /// Store a validated document. Returns the stored document, which is
    /// the earlier one if this DID was already registered with the same key.
    pub fn register(&self, document: &DidDocument) -> Result<DidDocument, DidError> {
        document.validate()?;
        let key = document.id.as_bytes();

        if let Some(existing) = self.db.get::<DidDocument>(self.db.dids(), key)? {
            if existing.verification_method == document.verification_method {
                debug!(did = %document.id, "DID already registered");
                return Ok(existing);
            }
            return Err(DidError::Conflict(document.id.clone()));
        }

        self.db.put(self.db.dids(), key, document)?;
        info!(did = %document.id, "registered DID document");
        Ok(document.clone())
    }

    pub fn resolve(&self, did: &str) -> Result<Option<DidDocument>, DidError> {
        Ok(self.db.get(self.db.dids(), did.as_bytes())?)
    }

    /// Public key of a *registered* DID.
    pub fn public_key(&self, did: &str) -> Result<VeyPublicKey, DidError> {
        let document = self
            .resolve(did)?
            .ok_or_else(|| DidError::NotFound(did.to_string()))?;
        Ok(*VeyDid::parse(&document.id)?.public_key())
    }
}
