//! Proof-gated waybills and their append-only tracking history.
//!
//! A waybill is only written after its proof verifies against a fresh
//! revocation view. Tracking events are appended in one sled transaction
//! with the per-waybill head, so a waybill's history is totally ordered by
//! timestamp and never rewritten. Revoking the PID later stops new proofs
//! but leaves existing history readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::{debug, info};
use uuid::Uuid;

use super::condition::ShippingCondition;
use super::{ShippingError, TrackingError};
use crate::pid::Pid;
use crate::revocation::RevocationView;
use crate::storage::db::{be_u64, decode, encode, log_key, log_prefix};
use crate::storage::{DbError, VeyDB};
use crate::zkp::{verify_proof_fresh, ZkCircuit, ZkProof};

// ---------------------------------------------------------------------------
// Waybill types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub name: String,
    pub country: String,
}

/// The recipient as the shop knows them: a display name and the
/// requester-scoped `pidToken`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientInfo {
    pub name: String,
    pub pid_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierInfo {
    pub id: String,
    pub name: String,
}

/// What a shop submits to open a waybill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaybillRequest {
    pub pid: Pid,
    pub zk_proof: ZkProof,
    /// The conditions the shop asked for; the proof must match them exactly.
    pub conditions: ShippingCondition,
    #[serde(default)]
    pub parcel_weight: Option<f64>,
    #[serde(default)]
    pub parcel_size: Option<String>,
    #[serde(default)]
    pub carrier_zone: Option<String>,
    #[serde(default)]
    pub sender: Option<SenderInfo>,
    #[serde(default)]
    pub recipient: Option<RecipientInfo>,
    #[serde(default)]
    pub carrier: Option<CarrierInfo>,
}

/// A stored waybill. Carries the PID and the proof, never an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkpWaybill {
    pub waybill_id: String,
    pub tracking_number: String,
    pub pid: Pid,
    pub zk_proof: ZkProof,
    pub parcel_weight: Option<f64>,
    pub parcel_size: Option<String>,
    pub carrier_zone: Option<String>,
    pub sender: Option<SenderInfo>,
    pub recipient: Option<RecipientInfo>,
    pub carrier: Option<CarrierInfo>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WaybillBook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WaybillBook {
    db: VeyDB,
    circuit: ZkCircuit,
}

impl WaybillBook {
    /// `circuit` is the descriptor proofs are checked against.
    pub fn new(db: VeyDB, circuit: ZkCircuit) -> Self {
        Self { db, circuit }
    }

    /// Verify the request's proof, then store a new waybill.
    ///
    /// Nothing is written when verification fails.
    pub fn create(
        &self,
        request: WaybillRequest,
        revocations: &RevocationView,
        now: DateTime<Utc>,
    ) -> Result<ZkpWaybill, ShippingError> {
        if request.pid != request.zk_proof.public_inputs.pid {
            return Err(ShippingError::PidMismatch);
        }
        verify_proof_fresh(
            &request.zk_proof,
            &self.circuit,
            &request.conditions,
            revocations,
            now,
        )?;

        let waybill = ZkpWaybill {
            waybill_id: Uuid::new_v4().to_string(),
            tracking_number: format!("VEY{:010}", self.db.generate_id()?),
            pid: request.pid,
            zk_proof: request.zk_proof,
            parcel_weight: request.parcel_weight,
            parcel_size: request.parcel_size,
            carrier_zone: request.carrier_zone,
            sender: request.sender,
            recipient: request.recipient,
            carrier: request.carrier,
            created_at: now,
        };
        self.db
            .put(self.db.waybills(), waybill.waybill_id.as_bytes(), &waybill)?;
        self.db.flush()?;
        info!(
            waybill = %waybill.waybill_id,
            tracking_number = %waybill.tracking_number,
            pid = %waybill.pid,
            "waybill created"
        );
        Ok(waybill)
    }

    pub fn get(&self, waybill_id: &str) -> Result<Option<ZkpWaybill>, DbError> {
        self.db.get(self.db.waybills(), waybill_id.as_bytes())
    }

    /// Tracking history of a known waybill.
    pub fn tracking(&self, waybill_id: &str) -> Result<Vec<TrackingEvent>, TrackingError> {
        if !self.db.waybills().contains_key(waybill_id.as_bytes()).map_err(DbError::from)? {
            return Err(TrackingError::UnknownWaybill(waybill_id.to_string()));
        }
        TrackingLog::new(self.db.clone()).events(waybill_id)
    }
}

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Accepted,
    InTransit,
    OutForDelivery,
    Delivered,
    Failed,
}

/// Coarse location of a tracking scan. Carrier hubs, not the recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingLocation {
    pub country: String,
    #[serde(default)]
    pub admin1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub id: String,
    pub waybill_id: String,
    pub tracking_number: String,
    #[serde(rename = "type")]
    pub status: TrackingStatus,
    pub timestamp: DateTime<Utc>,
    pub location: Option<TrackingLocation>,
    pub description: Option<String>,
    pub carrier: Option<String>,
}

/// An event to append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub status: TrackingStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub location: Option<TrackingLocation>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
}

impl TrackingUpdate {
    pub fn new(status: TrackingStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            status,
            timestamp,
            location: None,
            description: None,
            carrier: None,
        }
    }

    pub fn at(mut self, location: TrackingLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn by_carrier(mut self, carrier: impl Into<String>) -> Self {
        self.carrier = Some(carrier.into());
        self
    }
}

/// Append-only tracking history, one log per waybill.
#[derive(Debug, Clone)]
pub struct TrackingLog {
    db: VeyDB,
}

impl TrackingLog {
    pub fn new(db: VeyDB) -> Self {
        Self { db }
    }

    /// Record `status` now.
    pub fn track(
        &self,
        waybill_id: &str,
        status: TrackingStatus,
        location: Option<TrackingLocation>,
    ) -> Result<TrackingEvent, TrackingError> {
        let mut update = TrackingUpdate::new(status, Utc::now());
        update.location = location;
        self.append(waybill_id, update)
    }

    /// Append an event. Equal timestamps keep arrival order; an earlier
    /// timestamp than the last stored event is refused.
    ///
    /// The head holds `last_ts(8B BE) || seq(8B BE)`. The sequence is
    /// global per waybill, so keys stay unique across equal timestamps.
    pub fn append(
        &self,
        waybill_id: &str,
        update: TrackingUpdate,
    ) -> Result<TrackingEvent, TrackingError> {
        let offered_ms = u64::try_from(update.timestamp.timestamp_millis())
            .map_err(|_| TrackingError::InvalidTimestamp)?;
        let trees = (
            self.db.waybills(),
            self.db.tracking(),
            self.db.tracking_heads(),
        );

        let event = trees
            .transaction(|(waybills, log, heads)| {
                let waybill: ZkpWaybill = match waybills.get(waybill_id.as_bytes())? {
                    Some(bytes) => decode(&bytes).map_err(abort)?,
                    None => {
                        return Err(ConflictableTransactionError::Abort(
                            TrackingError::UnknownWaybill(waybill_id.to_string()),
                        ))
                    }
                };
                let seq = match heads.get(waybill_id.as_bytes())? {
                    Some(bytes) if bytes.len() == 16 => {
                        let last_ms = be_u64(&bytes[..8]).map_err(abort)?;
                        let last_seq = be_u64(&bytes[8..]).map_err(abort)?;
                        if offered_ms < last_ms {
                            return Err(ConflictableTransactionError::Abort(
                                TrackingError::OutOfOrderEvent {
                                    last_ms,
                                    offered_ms,
                                },
                            ));
                        }
                        last_seq + 1
                    }
                    Some(_) => {
                        return Err(abort(DbError::Serialization(
                            "corrupt tracking head".into(),
                        )))
                    }
                    None => 0,
                };
                let event = TrackingEvent {
                    id: Uuid::new_v4().to_string(),
                    waybill_id: waybill_id.to_string(),
                    tracking_number: waybill.tracking_number,
                    status: update.status,
                    timestamp: update.timestamp,
                    location: update.location.clone(),
                    description: update.description.clone(),
                    carrier: update.carrier.clone(),
                };
                log.insert(
                    log_key(waybill_id, offered_ms, seq),
                    encode(&event).map_err(abort)?,
                )?;
                let mut head = Vec::with_capacity(16);
                head.extend_from_slice(&offered_ms.to_be_bytes());
                head.extend_from_slice(&seq.to_be_bytes());
                heads.insert(waybill_id.as_bytes(), head)?;
                Ok(event)
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => TrackingError::Storage(DbError::Sled(e)),
            })?;

        self.db.flush()?;
        debug!(
            waybill = %event.waybill_id,
            status = ?event.status,
            "tracking event appended"
        );
        Ok(event)
    }

    /// History of `waybill_id` in timestamp order.
    pub fn events(&self, waybill_id: &str) -> Result<Vec<TrackingEvent>, TrackingError> {
        Ok(self
            .db
            .scan_prefix(self.db.tracking(), &log_prefix(waybill_id))?)
    }
}

fn abort(e: DbError) -> ConflictableTransactionError<TrackingError> {
    ConflictableTransactionError::Abort(TrackingError::Storage(e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
