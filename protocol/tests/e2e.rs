//! End-to-end integration tests for the VEY protocol.
//!
//! These tests run the holder, shop and carrier flows through the public
//! API only: registration, signed shipping requests, proof verification,
//! waybills, tracking, revocation and audited resolution.
//!
//! Each test gets its own temporary database. The Groth16 proving key is
//! generated once per test binary from a fixed seed.

use std::sync::{Arc, OnceLock};

use ark_std::rand::{rngs::StdRng, SeedableRng};
use chrono::{Duration, Utc};

use vey_protocol::crypto::keys::VeyKeypair;
use vey_protocol::identity::VeyDid;
use vey_protocol::pid::{NormalizedAddress, Precision, ResourcePattern};
use vey_protocol::resolver::{AccessControlPolicy, Action, AuditResult, AuditSink, Requester, ResolveError};
use vey_protocol::revocation::RevocationReason;
use vey_protocol::shipping::{
    ParcelInfo, ShippingCondition, ShippingError, ShippingValidationRequest, TrackingStatus,
    TrackingUpdate, WaybillRequest,
};
use vey_protocol::storage::VeyDB;
use vey_protocol::zkp::{verify, verify_fresh, ShippingProver};
use vey_protocol::{AddressProvider, ProviderSecrets};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn prover() -> Arc<ShippingProver> {
    static KEY: OnceLock<Vec<u8>> = OnceLock::new();
    let bytes = KEY.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(42);
        ShippingProver::setup(&mut rng)
            .expect("setup")
            .to_bytes()
            .expect("proving key bytes")
    });
    Arc::new(ShippingProver::from_bytes(bytes).expect("proving key"))
}

struct Holder {
    keypair: VeyKeypair,
    did: String,
}

impl Holder {
    fn new() -> Self {
        let keypair = VeyKeypair::generate();
        let did = VeyDid::from_public_key(&keypair.public_key()).to_did_string();
        Self { keypair, did }
    }
}

fn shibuya() -> NormalizedAddress {
    NormalizedAddress::new("JP")
        .with_admin1("13")
        .with_locality("SHIBUYA")
        .with_block("1-2")
        .with_building("HILLS")
        .with_unit("NORTH-7")
}

fn jp_30kg() -> ShippingCondition {
    ShippingCondition::default().countries(["JP"]).max_weight_kg(30.0)
}

fn carrier() -> Requester {
    Requester::new("yamato", ["carrier"])
}

fn carrier_policies() -> Vec<AccessControlPolicy> {
    vec![AccessControlPolicy {
        id: "carriers-jp".into(),
        subject_role: "carrier".into(),
        resource: ResourcePattern::parse("JP-*").unwrap(),
        allowed_actions: vec![Action::Resolve, Action::Track],
        valid_from: Utc::now() - Duration::hours(1),
        valid_to: None,
    }]
}

fn request(holder: &Holder, pid: &vey_protocol::Pid, conditions: ShippingCondition) -> ShippingValidationRequest {
    ShippingValidationRequest::signed(
        &holder.keypair,
        pid.clone(),
        conditions,
        "shop-1",
        Utc::now(),
        Some(ParcelInfo::new(4.0, None)),
    )
    .unwrap()
}

fn waybill_request(pid: &vey_protocol::Pid, response_proof: vey_protocol::zkp::ZkProof) -> WaybillRequest {
    WaybillRequest {
        pid: pid.clone(),
        zk_proof: response_proof,
        conditions: jp_30kg(),
        parcel_weight: Some(4.0),
        parcel_size: None,
        carrier_zone: None,
        sender: None,
        recipient: None,
        carrier: None,
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn jp_address_proves_for_jp_and_is_rejected_for_us() {
    let provider = AddressProvider::new(VeyDB::open_temporary().unwrap(), ProviderSecrets::generate(), prover());
    let holder = Holder::new();
    let reg = provider
        .register_address(&shibuya(), &holder.did, Precision::Locality)
        .unwrap();

    let ok = provider.validator().handle(&request(&holder, &reg.pid, jp_30kg()));
    assert!(ok.valid, "{:?}", ok.error);
    let proof = ok.zk_proof.clone().unwrap();
    assert!(verify(&proof, provider.circuit(), &jp_30kg()).valid);
    assert!(ok.pid_token.is_some());

    let json = serde_json::to_string(&ok).unwrap();
    for secret in ["SHIBUYA", "HILLS", "NORTH-7"] {
        assert!(!json.contains(secret), "{secret} leaked into the response");
    }

    let us = ShippingCondition::default().countries(["US"]);
    let rejected = provider.validator().handle(&request(&holder, &reg.pid, us.clone()));
    assert!(!rejected.valid);
    assert!(rejected.zk_proof.is_none());
    assert_eq!(rejected.error.as_deref(), Some("conditions not met"));

    // The JP proof does not carry over to the US conditions.
    assert!(!verify(&proof, provider.circuit(), &us).valid);
}

#[test]
fn revocation_blocks_validation_and_resolution_but_keeps_history() {
    let provider = AddressProvider::new(VeyDB::open_temporary().unwrap(), ProviderSecrets::generate(), prover());
    let holder = Holder::new();
    let reg = provider
        .register_address(&shibuya(), &holder.did, Precision::Locality)
        .unwrap();

    let response = provider
        .validator()
        .validate(&request(&holder, &reg.pid, jp_30kg()), Utc::now())
        .unwrap();
    let proof = response.zk_proof.unwrap();
    let now = Utc::now();
    let waybill = provider
        .waybills()
        .create(waybill_request(&reg.pid, proof.clone()), &provider.revocation_view().unwrap(), now)
        .unwrap();

    let resolver = provider.resolver();
    resolver
        .track_event(
            &waybill.waybill_id,
            TrackingUpdate::new(TrackingStatus::Accepted, now),
            &carrier(),
            &carrier_policies(),
        )
        .unwrap();
    resolver
        .track_event(
            &waybill.waybill_id,
            TrackingUpdate::new(TrackingStatus::InTransit, now + Duration::minutes(30)),
            &carrier(),
            &carrier_policies(),
        )
        .unwrap();
    assert_eq!(resolver.resolve(&reg.pid, &carrier(), &carrier_policies()).unwrap(), shibuya());

    provider
        .revoke_pid(&reg.pid, RevocationReason::UserRequest)
        .unwrap();

    assert!(matches!(
        provider
            .validator()
            .validate(&request(&holder, &reg.pid, jp_30kg()), Utc::now()),
        Err(ShippingError::Revoked)
    ));
    assert!(matches!(
        resolver.resolve(&reg.pid, &carrier(), &carrier_policies()),
        Err(ResolveError::Revoked)
    ));

    let view = provider.revocation_view().unwrap();
    assert!(!verify_fresh(&proof, provider.circuit(), &jp_30kg(), &view, Utc::now()).valid);
    assert!(provider
        .waybills()
        .create(waybill_request(&reg.pid, proof), &view, Utc::now())
        .is_err());

    let events = provider.waybills().tracking(&waybill.waybill_id).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].status, TrackingStatus::InTransit);

    let results: Vec<_> = resolver
        .history(&reg.pid)
        .unwrap()
        .into_iter()
        .filter(|e| e.action == Action::Resolve)
        .map(|e| e.result)
        .collect();
    assert_eq!(results, vec![AuditResult::Success, AuditResult::Error]);
}

#[test]
fn address_change_moves_holder_to_new_pid() {
    let provider = AddressProvider::new(VeyDB::open_temporary().unwrap(), ProviderSecrets::generate(), prover());
    let holder = Holder::new();
    let old = provider
        .register_address(&shibuya(), &holder.did, Precision::Locality)
        .unwrap();
    let yokohama = NormalizedAddress::new("JP").with_admin1("14").with_locality("NAKA");
    let new = provider
        .change_address(&old.pid, &holder.did, &yokohama, Precision::Locality)
        .unwrap();

    assert_eq!(provider.revocations().successor(&old.pid).unwrap(), Some(new.pid.clone()));
    assert!(matches!(
        provider
            .validator()
            .validate(&request(&holder, &old.pid, jp_30kg()), Utc::now()),
        Err(ShippingError::Revoked)
    ));
    let response = provider
        .validator()
        .validate(&request(&holder, &new.pid, jp_30kg()), Utc::now())
        .unwrap();
    assert!(response.valid);
}

#[test]
fn denied_resolution_returns_nothing_and_is_audited() {
    let provider = AddressProvider::new(VeyDB::open_temporary().unwrap(), ProviderSecrets::generate(), prover());
    let holder = Holder::new();
    let reg = provider
        .register_address(&shibuya(), &holder.did, Precision::Locality)
        .unwrap();

    let shop = Requester::new("shop-1", ["merchant"]);
    assert!(matches!(
        provider.resolver().resolve(&reg.pid, &shop, &carrier_policies()),
        Err(ResolveError::Denied)
    ));
    let history = provider.resolver().history(&reg.pid).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].result, AuditResult::Denied);
    assert_eq!(history[0].accessor, "shop-1");
}

#[test]
fn registrations_and_audit_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = ProviderSecrets::generate();
    let holder = Holder::new();

    let pid = {
        let provider = AddressProvider::new(VeyDB::open(dir.path()).unwrap(), secrets.clone(), prover());
        let reg = provider
            .register_address(&shibuya(), &holder.did, Precision::Locality)
            .unwrap();
        provider
            .resolver()
            .resolve(&reg.pid, &carrier(), &carrier_policies())
            .unwrap();
        reg.pid
    };

    let provider = AddressProvider::new(VeyDB::open(dir.path()).unwrap(), secrets, prover());
    assert!(provider.credentials().get(&pid).unwrap().is_some());
    assert_eq!(provider.resolver().history(&pid).unwrap().len(), 1);
    assert_eq!(
        provider
            .resolver()
            .resolve(&pid, &carrier(), &carrier_policies())
            .unwrap(),
        shibuya()
    );
    let audit = vey_protocol::resolver::SledAuditLog::new(provider.db().clone());
    assert_eq!(audit.history(&pid).unwrap().len(), 2);
}
