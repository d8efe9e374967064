//! The only path from a PID back to a literal address.
//!
//! ```text
//! policy ─► revoked? ─► audit(Success) ─► revoked? ─► decrypt ─► address
//!   │           │             │               │
//!   ▼           ▼             ▼               ▼
//! Denied     Revoked   AuditWriteFailure   Revoked
//! ```
//!
//! The success entry is durable before the vault is opened, and the second
//! revocation check closes the window where a revocation lands between the
//! first check and the audit commit. Denials and refusals are audited best
//! effort; their failure never turns a refusal into a success.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use super::audit::{AuditError, AuditLogEntry, AuditResult, AuditSink};
use super::policy::{authorize, AccessControlPolicy, Action, Requester};
use crate::pid::{NormalizedAddress, Pid};
use crate::revocation::{RevocationError, RevocationRegistry};
use crate::shipping::{TrackingError, TrackingEvent, TrackingLocation, TrackingLog, TrackingUpdate, WaybillBook};
use crate::storage::DbError;
use crate::vault::{AddressVault, VaultError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("access denied")]
    Denied,

    #[error("PID revoked")]
    Revoked,

    #[error("unknown PID")]
    UnknownPid,

    /// Fatal: nothing is returned without a durable audit record.
    #[error("audit write failed: {0}")]
    AuditWriteFailure(AuditError),

    #[error("vault error: {0}")]
    Vault(VaultError),

    #[error(transparent)]
    Revocation(#[from] RevocationError),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

#[derive(Clone)]
pub struct Resolver {
    vault: AddressVault,
    revocations: RevocationRegistry,
    audit: Arc<dyn AuditSink>,
    waybills: WaybillBook,
    tracking: TrackingLog,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(
        vault: AddressVault,
        revocations: RevocationRegistry,
        audit: Arc<dyn AuditSink>,
        waybills: WaybillBook,
        tracking: TrackingLog,
    ) -> Self {
        Self {
            vault,
            revocations,
            audit,
            waybills,
            tracking,
        }
    }

    /// Resolve `pid` for `requester` under `policies`.
    pub fn resolve(
        &self,
        pid: &Pid,
        requester: &Requester,
        policies: &[AccessControlPolicy],
    ) -> Result<NormalizedAddress, ResolveError> {
        self.resolve_at(pid, requester, policies, Utc::now())
    }

    /// [`resolve`](Self::resolve) at an explicit instant.
    pub fn resolve_at(
        &self,
        pid: &Pid,
        requester: &Requester,
        policies: &[AccessControlPolicy],
        now: DateTime<Utc>,
    ) -> Result<NormalizedAddress, ResolveError> {
        let Some(policy) = authorize(policies, requester, pid, Action::Resolve, now) else {
            warn!(%pid, requester = %requester.id, "resolution denied by policy");
            self.audit_best_effort(
                AuditLogEntry::new(pid, &requester.id, Action::Resolve, now, AuditResult::Denied)
                    .with_reason("no matching policy"),
            );
            return Err(ResolveError::Denied);
        };

        if self.revocations.is_revoked(pid.as_str(), None)? {
            self.refuse(pid, requester, now, "revoked");
            return Err(ResolveError::Revoked);
        }
        if !self.vault.contains(pid).map_err(ResolveError::Vault)? {
            self.refuse(pid, requester, now, "unknown pid");
            return Err(ResolveError::UnknownPid);
        }

        let entry = AuditLogEntry::new(pid, &requester.id, Action::Resolve, now, AuditResult::Success)
            .with_reason(format!("policy {}", policy.id));
        self.audit
            .append(&entry)
            .map_err(ResolveError::AuditWriteFailure)?;

        if self.revocations.is_revoked(pid.as_str(), None)? {
            self.refuse(pid, requester, now, "revoked during resolution");
            return Err(ResolveError::Revoked);
        }

        let address = match self.vault.open(pid) {
            Ok(address) => address,
            Err(VaultError::UnknownPid) => return Err(ResolveError::UnknownPid),
            Err(e) => return Err(ResolveError::Vault(e)),
        };
        info!(%pid, requester = %requester.id, policy = %policy.id, "address resolved");
        Ok(address)
    }

    /// Append a tracking event for `waybill_id`, authorized against the
    /// waybill's PID.
    pub fn track_event(
        &self,
        waybill_id: &str,
        update: TrackingUpdate,
        requester: &Requester,
        policies: &[AccessControlPolicy],
    ) -> Result<TrackingEvent, ResolveError> {
        let waybill = self
            .waybills
            .get(waybill_id)?
            .ok_or_else(|| TrackingError::UnknownWaybill(waybill_id.to_string()))?;
        let now = Utc::now();
        if authorize(policies, requester, &waybill.pid, Action::Track, now).is_none() {
            warn!(waybill = %waybill_id, requester = %requester.id, "tracking update denied by policy");
            self.audit_best_effort(
                AuditLogEntry::new(&waybill.pid, &requester.id, Action::Track, now, AuditResult::Denied)
                    .with_reason("no matching policy"),
            );
            return Err(ResolveError::Denied);
        }
        let event = self.tracking.append(waybill_id, update)?;
        self.audit_best_effort(AuditLogEntry::new(
            &waybill.pid,
            &requester.id,
            Action::Track,
            now,
            AuditResult::Success,
        ));
        Ok(event)
    }

    /// Convenience form of [`track_event`](Self::track_event) stamped now.
    pub fn track(
        &self,
        waybill_id: &str,
        status: crate::shipping::TrackingStatus,
        location: Option<TrackingLocation>,
        requester: &Requester,
        policies: &[AccessControlPolicy],
    ) -> Result<TrackingEvent, ResolveError> {
        let mut update = TrackingUpdate::new(status, Utc::now());
        update.location = location;
        self.track_event(waybill_id, update, requester, policies)
    }

    /// Audit trail of `pid`, oldest first.
    pub fn history(&self, pid: &Pid) -> Result<Vec<AuditLogEntry>, AuditError> {
        self.audit.history(pid)
    }

    fn refuse(&self, pid: &Pid, requester: &Requester, now: DateTime<Utc>, reason: &str) {
        warn!(%pid, requester = %requester.id, reason, "resolution refused");
        self.audit_best_effort(
            AuditLogEntry::new(pid, &requester.id, Action::Resolve, now, AuditResult::Error)
                .with_reason(reason),
        );
    }

    fn audit_best_effort(&self, entry: AuditLogEntry) {
        if let Err(e) = self.audit.append(&entry) {
            warn!(pid = %entry.pid, error = %e, "audit write for refusal failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
