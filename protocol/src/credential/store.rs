//! Credentials by PID.

use tracing::debug;

use super::address::AddressCredential;
use super::CredentialError;
use crate::pid::Pid;
use crate::storage::VeyDB;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    db: VeyDB,
}

impl CredentialStore {
    pub fn new(db: VeyDB) -> Self {
        Self { db }
    }

    /// Store `credential` under its PID. A PID carries one credential; a
    /// later one for the same PID replaces it.
    pub fn put(&self, credential: &AddressCredential) -> Result<(), CredentialError> {
        self.db
            .put(self.db.credentials(), credential.pid.as_bytes(), credential)?;
        self.db.flush()?;
        debug!(pid = %credential.pid, credential = %credential.id, "stored credential");
        Ok(())
    }

    pub fn get(&self, pid: &Pid) -> Result<Option<AddressCredential>, CredentialError> {
        Ok(self.db.get(self.db.credentials(), pid.as_bytes())?)
    }

    /// Holder DID bound to `pid`, if a credential exists.
    pub fn holder(&self, pid: &Pid) -> Result<Option<String>, CredentialError> {
        Ok(self.get(pid)?.map(|c| c.did))
    }
}
