//! # Requester Authentication
//!
//! Carriers and operators call the gated endpoints with a
//! [`SignedRequest`]. The node checks the signature against the signer's
//! `did:key`, then looks the DID up in its [`RequesterDirectory`] to find
//! the roles policies are matched against. Roles are never taken from the
//! request body.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use vey_protocol::identity::SignedRequest;
use vey_protocol::resolver::Requester;
use vey_protocol::VeyError;

/// Node-configured roles, keyed by requester DID.
#[derive(Debug, Clone, Default)]
pub struct RequesterDirectory {
    roles: HashMap<String, Vec<String>>,
}

impl RequesterDirectory {
    pub fn new(entries: impl IntoIterator<Item = Requester>) -> Self {
        Self {
            roles: entries.into_iter().map(|r| (r.id, r.roles)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// The authenticated requester behind `request`, or an
    /// `Authentication` error when the signature fails or the DID is not
    /// in the directory.
    pub fn authenticate<T: Serialize>(
        &self,
        request: &SignedRequest<T>,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<Requester, VeyError> {
        request.verify(scope, now).map_err(|e| {
            warn!(signer = %request.signer, scope, error = %e, "request authentication failed");
            VeyError::from(e)
        })?;
        let roles = self.roles.get(&request.signer).ok_or_else(|| {
            warn!(signer = %request.signer, scope, "unknown requester");
            VeyError::Authentication("unknown requester".into())
        })?;
        Ok(Requester {
            id: request.signer.clone(),
            roles: roles.clone(),
        })
    }
}
