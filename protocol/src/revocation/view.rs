//! Consumer-side view of the revocation list.
//!
//! A verifier never trusts a list it has not checked the signature of, and
//! never trusts a list older than `max_staleness`. Age is measured from
//! the signed `updated_at`, so replaying an old (validly signed) list does
//! not reset the clock.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::list::RevocationList;
use super::RevocationError;
use crate::config::MAX_REVOCATION_STALENESS;
use crate::crypto::keys::VeyPublicKey;

/// A verified, cached revocation list.
#[derive(Debug, Clone)]
pub struct RevocationView {
    list: RevocationList,
    issuer_key: VeyPublicKey,
    max_staleness: Duration,
}

impl RevocationView {
    /// Verify `list` and wrap it, using the protocol default staleness.
    pub fn new(list: RevocationList, issuer_key: VeyPublicKey) -> Result<Self, RevocationError> {
        Self::with_max_staleness(list, issuer_key, default_max_staleness())
    }

    pub fn with_max_staleness(
        list: RevocationList,
        issuer_key: VeyPublicKey,
        max_staleness: Duration,
    ) -> Result<Self, RevocationError> {
        list.verify(&issuer_key)?;
        Ok(Self {
            list,
            issuer_key,
            max_staleness,
        })
    }

    /// Replace the cached list with a newer one. Lists with a bad
    /// signature or a lower version are refused and the old list is kept.
    pub fn refresh(&mut self, list: RevocationList) -> Result<(), RevocationError> {
        list.verify(&self.issuer_key)?;
        if list.version < self.list.version {
            return Err(RevocationError::VersionRollback {
                cached: self.list.version,
                offered: list.version,
            });
        }
        debug!(from = self.list.version, to = list.version, "revocation list refreshed");
        self.list = list;
        Ok(())
    }

    pub fn version(&self) -> u64 {
        self.list.version
    }

    pub fn list(&self) -> &RevocationList {
        &self.list
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.list.updated_at > self.max_staleness
    }

    /// Fail closed: a stale list is an error even if `id` is absent from it.
    pub fn check(&self, id: &str, now: DateTime<Utc>) -> Result<(), RevocationError> {
        if self.is_stale(now) {
            let age = now - self.list.updated_at;
            warn!(age_secs = age.num_seconds(), "refusing stale revocation list");
            return Err(RevocationError::Stale {
                age_secs: age.num_seconds(),
                max_secs: self.max_staleness.num_seconds(),
            });
        }
        match self.list.find(id) {
            Some(entry) => Err(RevocationError::Revoked {
                id: id.to_string(),
                version: entry.version,
            }),
            None => Ok(()),
        }
    }
}

/// [`MAX_REVOCATION_STALENESS`] as a chrono duration.
pub fn default_max_staleness() -> Duration {
    Duration::from_std(MAX_REVOCATION_STALENESS).unwrap_or_else(|_| Duration::minutes(10))
}

/// A [`RevocationView`] shared across request handlers, refetched lazily
/// once it goes stale.
#[derive(Debug)]
pub struct RevocationCache {
    issuer_key: VeyPublicKey,
    max_staleness: Duration,
    view: RwLock<Option<RevocationView>>,
}

impl RevocationCache {
    pub fn new(issuer_key: VeyPublicKey, max_staleness: Duration) -> Self {
        Self {
            issuer_key,
            max_staleness,
            view: RwLock::new(None),
        }
    }

    /// A fresh view, calling `fetch` first when the cache is empty or stale.
    pub fn current<F>(&self, now: DateTime<Utc>, fetch: F) -> Result<RevocationView, RevocationError>
    where
        F: FnOnce() -> Result<RevocationList, RevocationError>,
    {
        if let Some(view) = self.view.read().as_ref() {
            if !view.is_stale(now) {
                return Ok(view.clone());
            }
        }

        let mut slot = self.view.write();
        // Another handler may have refreshed while we waited for the lock.
        if let Some(view) = slot.as_ref() {
            if !view.is_stale(now) {
                return Ok(view.clone());
            }
        }
        let list = fetch()?;
        match slot.as_mut() {
            Some(view) => view.refresh(list)?,
            None => {
                *slot = Some(RevocationView::with_max_staleness(
                    list,
                    self.issuer_key,
                    self.max_staleness,
                )?)
            }
        }
        slot.clone().ok_or(RevocationError::BadSignature)
    }
}
