//! # REST API
//!
//! The axum router in front of an [`AddressProvider`]. Handlers share state
//! through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                    | Description                                  |
//! |--------|-------------------------|----------------------------------------------|
//! | GET    | `/health`               | Liveness probe                               |
//! | GET    | `/status`               | Node and circuit summary                     |
//! | POST   | `/addresses`            | Register an address (or move to a new one)   |
//! | POST   | `/shipping/validate`    | Signed shipping validation, returns a proof  |
//! | POST   | `/proofs/verify`        | Verify a proof against conditions            |
//! | POST   | `/waybills`             | Open a waybill from a verified proof         |
//! | GET    | `/waybills/:id`         | Waybill by id                                |
//! | POST   | `/waybills/:id/events`  | Append a tracking event (policy-gated)       |
//! | GET    | `/waybills/:id/events`  | Tracking history                             |
//! | GET    | `/revocations`          | Signed revocation list                       |
//! | POST   | `/revocations`          | Revoke a PID (policy-gated)                  |
//! | POST   | `/resolve`              | Audited PID → address resolution             |
//! | GET    | `/circuit`              | Public circuit descriptor                    |
//!
//! `POST /addresses`, `POST /waybills/:id/events`, `POST /revocations` and
//! `POST /resolve` take a [`SignedRequest`] whose scope is the method and
//! path. Registration must be signed by the owner DID. The gated endpoints
//! resolve the signer's roles from the node's [`RequesterDirectory`] and
//! only then consult the access-control policies.
//!
//! Errors carry `{ "error": ..., "code": ... }` where `code` is the
//! [`VeyError::kind`] string. Storage and internal failures are reported as
//! a bare "internal error"; the detail only goes to the log.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use vey_protocol::identity::{did_to_public_key, SignedRequest};
use vey_protocol::pid::{NormalizedAddress, Pid, Precision};
use vey_protocol::resolver::{authorize, AccessControlPolicy, Action};
use vey_protocol::revocation::{RevocationEntry, RevocationList, RevocationReason};
use vey_protocol::shipping::{
    ShippingCondition, ShippingValidationRequest, ShippingValidationResponse, TrackingEvent,
    TrackingUpdate, WaybillRequest, ZkpWaybill,
};
use vey_protocol::storage::DbStats;
use vey_protocol::zkp::{verify_fresh, VerificationResult, ZkCircuit, ZkProof};
use vey_protocol::{AddressProvider, Registration, VeyError};

use crate::auth::RequesterDirectory;
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub provider: Arc<AddressProvider>,
    /// Access-control policies for resolve, track and revoke.
    pub policies: Arc<Vec<AccessControlPolicy>>,
    /// Who may call the gated endpoints, and with which roles.
    pub requesters: Arc<RequesterDirectory>,
    pub metrics: SharedMetrics,
    pub started_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/addresses", post(register_address_handler))
        .route("/shipping/validate", post(validate_shipping_handler))
        .route("/proofs/verify", post(verify_proof_handler))
        .route("/waybills", post(create_waybill_handler))
        .route("/waybills/:id", get(waybill_handler))
        .route(
            "/waybills/:id/events",
            get(tracking_history_handler).post(track_event_handler),
        )
        .route(
            "/revocations",
            get(revocation_list_handler).post(revoke_handler),
        )
        .route("/resolve", post(resolve_handler))
        .route("/circuit", get(circuit_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Signing scope of each authenticated endpoint.
pub const REGISTER_SCOPE: &str = "POST /addresses";
pub const REVOKE_SCOPE: &str = "POST /revocations";
pub const RESOLVE_SCOPE: &str = "POST /resolve";

pub fn track_scope(waybill_id: &str) -> String {
    format!("POST /waybills/{waybill_id}/events")
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler error. Anything that folds into [`VeyError`] converts with `?`.
#[derive(Debug)]
pub struct ApiError(VeyError);

impl<E> From<E> for ApiError
where
    E: Into<VeyError>,
{
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

impl ApiError {
    fn internal(e: impl std::fmt::Display) -> Self {
        ApiError(VeyError::Internal(e.to_string()))
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            VeyError::Validation(_) => StatusCode::BAD_REQUEST,
            VeyError::Authentication(_) => StatusCode::UNAUTHORIZED,
            VeyError::Denied(_) => StatusCode::FORBIDDEN,
            VeyError::NotFound(_) => StatusCode::NOT_FOUND,
            VeyError::Revoked(_) => StatusCode::GONE,
            VeyError::ConditionNotMet | VeyError::ProofVerification(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            VeyError::AuditWriteFailure(_) | VeyError::StaleRevocationList(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            VeyError::Storage(_) | VeyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            error: message,
            code: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: String,
    pub protocol: String,
    pub circuit_id: String,
    pub params_hash: String,
    pub revocation_version: u64,
    pub storage: DbStats,
    pub uptime_secs: i64,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAddressRequest {
    pub address: NormalizedAddress,
    pub owner_did: String,
    #[serde(default)]
    pub precision: Precision,
    /// When set, the holder moves from this PID to the new address.
    #[serde(default)]
    pub replaces: Option<Pid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyProofRequest {
    pub proof: ZkProof,
    pub conditions: ShippingCondition,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackEventRequest {
    pub update: TrackingUpdate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub pid: Pid,
    pub reason: RevocationReason,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub pid: Pid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub pid: Pid,
    pub address: NormalizedAddress,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`. Liveness only; subsystem state belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let revocation_version = state.provider.revocations().version()?;
    state.metrics.revocation_list_version.set(revocation_version as i64);
    let circuit = state.provider.circuit();
    let now = Utc::now();
    Ok(Json(StatusResponse {
        version: state.version.clone(),
        protocol: format!(
            "{} ({})",
            vey_protocol::config::PROTOCOL_VERSION,
            vey_protocol::config::PROTOCOL_FINGERPRINT
        ),
        circuit_id: circuit.id.clone(),
        params_hash: circuit.params_hash.clone(),
        revocation_version,
        storage: state.provider.db().stats(),
        uptime_secs: (now - state.started_at).num_seconds(),
        timestamp: now.to_rfc3339(),
    }))
}

/// `POST /addresses`. With `replaces` set this is an address change and
/// the old PID is revoked. Either way the request must be signed by the
/// key behind `ownerDid`.
async fn register_address_handler(
    State(state): State<AppState>,
    Json(signed): Json<SignedRequest<RegisterAddressRequest>>,
) -> ApiResult<(StatusCode, Json<Registration>)> {
    did_to_public_key(&signed.payload.owner_did)?;
    signed.verify(REGISTER_SCOPE, Utc::now())?;
    if signed.signer != signed.payload.owner_did {
        warn!(signer = %signed.signer, "registration not signed by the owner DID");
        return Err(ApiError(VeyError::Authentication(
            "request must be signed by the owner DID".into(),
        )));
    }
    let req = signed.payload;
    let registration = match &req.replaces {
        Some(old) => {
            state
                .provider
                .change_address(old, &req.owner_did, &req.address, req.precision)?
        }
        None => state
            .provider
            .register_address(&req.address, &req.owner_did, req.precision)?,
    };
    state.metrics.addresses_registered_total.inc();
    Ok((StatusCode::CREATED, Json(registration)))
}

/// `POST /shipping/validate`. Proving is CPU-bound and runs on the blocking
/// pool. The response never says which predicate failed.
async fn validate_shipping_handler(
    State(state): State<AppState>,
    Json(req): Json<ShippingValidationRequest>,
) -> ApiResult<Json<ShippingValidationResponse>> {
    let validator = state.provider.validator().clone();
    let timer = state.metrics.proof_generation_seconds.start_timer();
    let response = tokio::task::spawn_blocking(move || validator.handle(&req))
        .await
        .map_err(ApiError::internal)?;
    timer.observe_duration();

    let result = if response.valid { "valid" } else { "rejected" };
    state.metrics.validations_total.with_label_values(&[result]).inc();
    Ok(Json(response))
}

/// `POST /proofs/verify`. Checks revocation and staleness first, then the
/// pairing equation.
async fn verify_proof_handler(
    State(state): State<AppState>,
    Json(req): Json<VerifyProofRequest>,
) -> ApiResult<Json<VerificationResult>> {
    let view = state.provider.revocation_view()?;
    let circuit = state.provider.circuit().clone();
    let result = tokio::task::spawn_blocking(move || {
        verify_fresh(&req.proof, &circuit, &req.conditions, &view, Utc::now())
    })
    .await
    .map_err(ApiError::internal)?;

    let label = if result.valid { "valid" } else { "invalid" };
    state.metrics.proof_verifications_total.with_label_values(&[label]).inc();
    Ok(Json(result))
}

async fn create_waybill_handler(
    State(state): State<AppState>,
    Json(req): Json<WaybillRequest>,
) -> ApiResult<(StatusCode, Json<ZkpWaybill>)> {
    let view = state.provider.revocation_view()?;
    let waybills = state.provider.waybills().clone();
    let waybill = tokio::task::spawn_blocking(move || waybills.create(req, &view, Utc::now()))
        .await
        .map_err(ApiError::internal)??;
    state.metrics.waybills_created_total.inc();
    Ok((StatusCode::CREATED, Json(waybill)))
}

async fn waybill_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ZkpWaybill>> {
    state
        .provider
        .waybills()
        .get(&id)?
        .map(Json)
        .ok_or_else(|| ApiError(VeyError::NotFound(format!("waybill {id}"))))
}

async fn track_event_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(signed): Json<SignedRequest<TrackEventRequest>>,
) -> ApiResult<(StatusCode, Json<TrackingEvent>)> {
    let requester = state
        .requesters
        .authenticate(&signed, &track_scope(&id), Utc::now())?;
    let event = state
        .provider
        .resolver()
        .track_event(&id, signed.payload.update, &requester, &state.policies)?;
    state.metrics.tracking_events_total.inc();
    Ok((StatusCode::CREATED, Json(event)))
}

async fn tracking_history_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TrackingEvent>>> {
    Ok(Json(state.provider.waybills().tracking(&id)?))
}

async fn revocation_list_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<RevocationList>> {
    let list = state.provider.revocations().publish()?;
    state.metrics.revocation_list_version.set(list.version as i64);
    Ok(Json(list))
}

/// `POST /revocations`. Address changes revoke through `POST /addresses`
/// so the successor link is recorded; they are refused here.
async fn revoke_handler(
    State(state): State<AppState>,
    Json(signed): Json<SignedRequest<RevokeRequest>>,
) -> ApiResult<(StatusCode, Json<RevocationEntry>)> {
    let requester = state.requesters.authenticate(&signed, REVOKE_SCOPE, Utc::now())?;
    let req = signed.payload;
    if matches!(req.reason, RevocationReason::AddressChange { .. }) {
        return Err(ApiError(VeyError::Validation(
            "address changes are submitted to /addresses with `replaces`".into(),
        )));
    }
    if authorize(&state.policies, &requester, &req.pid, Action::Revoke, Utc::now()).is_none() {
        warn!(pid = %req.pid, requester = %requester.id, "revocation denied by policy");
        return Err(ApiError(VeyError::Denied("no matching policy".into())));
    }
    let entry = state.provider.revoke_pid(&req.pid, req.reason)?;
    state.metrics.revocation_list_version.set(entry.version as i64);
    info!(pid = %req.pid, requester = %requester.id, version = entry.version, "PID revoked via API");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `POST /resolve`. The only endpoint that ever returns an address.
async fn resolve_handler(
    State(state): State<AppState>,
    Json(signed): Json<SignedRequest<ResolveRequest>>,
) -> ApiResult<Json<ResolveResponse>> {
    let requester = match state.requesters.authenticate(&signed, RESOLVE_SCOPE, Utc::now()) {
        Ok(requester) => requester,
        Err(e) => {
            state.metrics.resolutions_total.with_label_values(&[e.kind()]).inc();
            return Err(ApiError(e));
        }
    };
    let req = signed.payload;
    match state
        .provider
        .resolver()
        .resolve(&req.pid, &requester, &state.policies)
    {
        Ok(address) => {
            state.metrics.resolutions_total.with_label_values(&["success"]).inc();
            Ok(Json(ResolveResponse {
                pid: req.pid,
                address,
            }))
        }
        Err(e) => {
            let e = VeyError::from(e);
            state.metrics.resolutions_total.with_label_values(&[e.kind()]).inc();
            Err(ApiError(e))
        }
    }
}

async fn circuit_handler(State(state): State<AppState>) -> Json<ZkCircuit> {
    Json(state.provider.circuit().clone())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
