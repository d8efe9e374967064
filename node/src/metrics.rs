//! # Prometheus Metrics
//!
//! Operational counters for the provider node, served at `/metrics` on the
//! metrics port. Everything lives in a dedicated `vey`-prefixed registry.
//!
//! Labels are outcome classes only. A PID, DID or requester id never
//! becomes a label value.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    pub addresses_registered_total: IntCounter,
    /// Shipping validations, labelled `result` = `valid` | `rejected`.
    pub validations_total: IntCounterVec,
    pub proof_generation_seconds: Histogram,
    /// Standalone proof verifications, labelled `result` = `valid` | `invalid`.
    pub proof_verifications_total: IntCounterVec,
    pub waybills_created_total: IntCounter,
    pub tracking_events_total: IntCounter,
    /// Resolutions, labelled by outcome code (`success`, `ACCESS_DENIED`, ...).
    pub resolutions_total: IntCounterVec,
    pub revocation_list_version: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("vey".into()), None)?;

        let addresses_registered_total = IntCounter::new(
            "addresses_registered_total",
            "Addresses registered, including address changes",
        )?;
        registry.register(Box::new(addresses_registered_total.clone()))?;

        let validations_total = IntCounterVec::new(
            Opts::new("validations_total", "Shipping validation requests by result"),
            &["result"],
        )?;
        registry.register(Box::new(validations_total.clone()))?;

        let proof_generation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "proof_generation_seconds",
                "Wall time of a shipping validation including Groth16 proving",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(proof_generation_seconds.clone()))?;

        let proof_verifications_total = IntCounterVec::new(
            Opts::new("proof_verifications_total", "Proof verifications by result"),
            &["result"],
        )?;
        registry.register(Box::new(proof_verifications_total.clone()))?;

        let waybills_created_total =
            IntCounter::new("waybills_created_total", "Waybills created from verified proofs")?;
        registry.register(Box::new(waybills_created_total.clone()))?;

        let tracking_events_total =
            IntCounter::new("tracking_events_total", "Tracking events appended")?;
        registry.register(Box::new(tracking_events_total.clone()))?;

        let resolutions_total = IntCounterVec::new(
            Opts::new("resolutions_total", "PID resolutions by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(resolutions_total.clone()))?;

        let revocation_list_version = IntGauge::new(
            "revocation_list_version",
            "Version of the latest revocation list",
        )?;
        registry.register(Box::new(revocation_list_version.clone()))?;

        Ok(Self {
            registry,
            addresses_registered_total,
            validations_total,
            proof_generation_seconds,
            proof_verifications_total,
            waybills_created_total,
            tracking_events_total,
            resolutions_total,
            revocation_list_version,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub type SharedMetrics = Arc<NodeMetrics>;

pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
