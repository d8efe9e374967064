//! Append-only audit trail of every resolution attempt.
//!
//! The [`AuditSink`] trait is the seam between the resolver and durable
//! storage. [`SledAuditLog`] only returns once the entry is flushed; a
//! successful `append` means the entry survives a crash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::policy::Action;
use crate::pid::Pid;
use crate::storage::db::{log_key, log_prefix};
use crate::storage::{DbError, VeyDB};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Denied,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: String,
    pub pid: Pid,
    /// Requester id.
    pub accessor: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub result: AuditResult,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AuditLogEntry {
    pub fn new(
        pid: &Pid,
        accessor: &str,
        action: Action,
        timestamp: DateTime<Utc>,
        result: AuditResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pid: pid.clone(),
            accessor: accessor.to_string(),
            action,
            timestamp,
            result,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Durable, append-only audit storage.
pub trait AuditSink: Send + Sync {
    /// Persist `entry`. `Ok` means durable.
    fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError>;

    /// Every entry for `pid`, oldest first.
    fn history(&self, pid: &Pid) -> Result<Vec<AuditLogEntry>, AuditError>;
}

/// Audit log in the `audit` sled tree.
#[derive(Debug, Clone)]
pub struct SledAuditLog {
    db: VeyDB,
}

impl SledAuditLog {
    pub fn new(db: VeyDB) -> Self {
        Self { db }
    }
}

impl AuditSink for SledAuditLog {
    fn append(&self, entry: &AuditLogEntry) -> Result<(), AuditError> {
        let ts = u64::try_from(entry.timestamp.timestamp_millis()).unwrap_or(0);
        // Globally unique and monotonic, so equal timestamps keep append order.
        let seq = self.db.generate_id()?;
        self.db
            .put(self.db.audit(), &log_key(entry.pid.as_str(), ts, seq), entry)?;
        self.db.flush()?;
        debug!(pid = %entry.pid, accessor = %entry.accessor, result = ?entry.result, "audit entry written");
        Ok(())
    }

    fn history(&self, pid: &Pid) -> Result<Vec<AuditLogEntry>, AuditError> {
        Ok(self
            .db
            .scan_prefix(self.db.audit(), &log_prefix(pid.as_str()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pid::{encode, NormalizedAddress, Precision};
    use chrono::Duration;

    fn pid(admin1: &str) -> Pid {
        encode(&NormalizedAddress::new("JP").with_admin1(admin1), Precision::Admin1).unwrap()
    }

    #[test]
    fn history_is_per_pid_and_ordered() {
        let log = SledAuditLog::new(VeyDB::open_temporary().unwrap());
        let t0 = Utc::now();
        let a = pid("13");
        let b = pid("27");

        log.append(&AuditLogEntry::new(&a, "c1", Action::Resolve, t0 + Duration::seconds(5), AuditResult::Success))
            .unwrap();
        log.append(&AuditLogEntry::new(&a, "c2", Action::Resolve, t0, AuditResult::Denied))
            .unwrap();
        log.append(&AuditLogEntry::new(&b, "c1", Action::Resolve, t0, AuditResult::Success))
            .unwrap();
        log.append(
            &AuditLogEntry::new(&a, "c3", Action::Resolve, t0, AuditResult::Error).with_reason("revoked"),
        )
        .unwrap();

        let history = log.history(&a).unwrap();
        let accessors: Vec<_> = history.iter().map(|e| e.accessor.as_str()).collect();
        assert_eq!(accessors, vec!["c2", "c3", "c1"]);
        assert_eq!(history[1].reason.as_deref(), Some("revoked"));
        assert_eq!(log.history(&b).unwrap().len(), 1);
    }
}
