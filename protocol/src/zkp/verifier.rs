//! # Groth16 Proof Verification
//!
//! Verification is a pure function of the proof, the public circuit
//! descriptor and the conditions the requester actually sent. It needs no
//! secrets and no storage, and it runs in constant time regardless of
//! circuit size (three pairings plus a small multi-scalar multiplication).
//!
//! Checks, in order, stopping at the first failure:
//!
//! 1. circuit id and proof type match the descriptor;
//! 2. the descriptor's verification key hashes to its `params_hash`;
//! 3. the proof's conditions equal the expected conditions;
//! 4. the carried conditions digest matches a fresh recomputation;
//! 5. the PID's own country, and admin1 when shown, are on the requested
//!    lists;
//! 6. the Groth16 pairing check over inputs rebuilt from (pid, conditions,
//!    commitment). The circuit ties the hidden country and region to the
//!    PID, so step 5 is also enforced inside the proof.
//!
//! [`verify_fresh`] puts revocation and staleness in front of all of that.

use ark_bn254::Bn254;
use ark_groth16::{Groth16, Proof, VerifyingKey};
use ark_serialize::CanonicalDeserialize;
use ark_snark::SNARK;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::circuit::PublicInputs;
use super::commitment::{fr_from_hex, fr_to_hex};
use super::types::{VerificationResult, ZkCircuit, ZkProof};
use super::ZkpError;
use crate::config::PROOF_TYPE;
use crate::crypto::hash::blake3_hash;
use crate::revocation::RevocationView;
use crate::pid::Pid;
use crate::shipping::condition::{normalize_code, ShippingCondition};

/// Verify `proof` for `expected_conditions` against `circuit`.
pub fn verify(
    proof: &ZkProof,
    circuit: &ZkCircuit,
    expected_conditions: &ShippingCondition,
) -> VerificationResult {
    match verify_proof(proof, circuit, expected_conditions) {
        Ok(()) => VerificationResult::ok(),
        Err(e) => {
            debug!(error = %e, "proof rejected");
            VerificationResult::failed(e)
        }
    }
}

/// [`verify`] with a fresh revocation view. Revocation and staleness win
/// over an otherwise valid proof.
pub fn verify_fresh(
    proof: &ZkProof,
    circuit: &ZkCircuit,
    expected_conditions: &ShippingCondition,
    revocations: &RevocationView,
    now: DateTime<Utc>,
) -> VerificationResult {
    match verify_proof_fresh(proof, circuit, expected_conditions, revocations, now) {
        Ok(()) => VerificationResult::ok(),
        Err(e) => VerificationResult::failed(e),
    }
}

/// Typed form of [`verify_fresh`].
pub fn verify_proof_fresh(
    proof: &ZkProof,
    circuit: &ZkCircuit,
    expected_conditions: &ShippingCondition,
    revocations: &RevocationView,
    now: DateTime<Utc>,
) -> Result<(), ZkpError> {
    if let Err(e) = revocations.check(proof.public_inputs.pid.as_str(), now) {
        warn!(pid = %proof.public_inputs.pid, error = %e, "proof refused by revocation check");
        return Err(e.into());
    }
    verify_proof(proof, circuit, expected_conditions)
}

/// Typed form of [`verify`].
pub fn verify_proof(
    proof: &ZkProof,
    circuit: &ZkCircuit,
    expected_conditions: &ShippingCondition,
) -> Result<(), ZkpError> {
    if proof.circuit_id != circuit.id {
        return Err(ZkpError::CircuitMismatch {
            expected: circuit.id.clone(),
            found: proof.circuit_id.clone(),
        });
    }
    if proof.proof_type != PROOF_TYPE || circuit.proof_type != PROOF_TYPE {
        return Err(ZkpError::UnsupportedProofType(proof.proof_type.clone()));
    }

    let vk_bytes = hex::decode(&circuit.verification_key)
        .map_err(|e| ZkpError::Malformed(format!("verification key hex: {e}")))?;
    if hex::encode(blake3_hash(&vk_bytes)) != circuit.params_hash {
        return Err(ZkpError::ParamsHashMismatch);
    }

    let inputs = &proof.public_inputs;
    if inputs.conditions != *expected_conditions {
        return Err(ZkpError::ConditionMismatch);
    }
    let digest = expected_conditions.digest()?;
    if fr_to_hex(&digest)? != inputs.conditions_digest {
        return Err(ZkpError::DigestMismatch);
    }

    if !pid_within(&inputs.pid, expected_conditions)? {
        return Err(ZkpError::PidOutsideConditions);
    }

    let commitment = fr_from_hex(&inputs.address_commitment)?;
    let public = PublicInputs::new(&inputs.pid, expected_conditions, commitment)?;

    let vk = VerifyingKey::<Bn254>::deserialize_compressed(&vk_bytes[..])
        .map_err(|e| ZkpError::Malformed(format!("verification key: {e}")))?;
    let proof_bytes =
        hex::decode(&proof.proof).map_err(|e| ZkpError::Malformed(format!("proof hex: {e}")))?;
    let ark_proof = Proof::<Bn254>::deserialize_compressed(&proof_bytes[..])
        .map_err(|e| ZkpError::Malformed(format!("proof: {e}")))?;

    match Groth16::<Bn254>::verify(&vk, &public.to_vec(), &ark_proof) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ZkpError::InvalidProof),
        Err(e) => {
            debug!(error = %e, "groth16 verifier error");
            Err(ZkpError::InvalidProof)
        }
    }
}

/// What the PID itself discloses must already satisfy the lists.
fn pid_within(pid: &Pid, conditions: &ShippingCondition) -> Result<bool, ZkpError> {
    let disclosed = pid.decode()?;
    let listed = |list: &Option<Vec<String>>, code: &str| {
        list.as_ref().map_or(true, |codes| {
            codes.iter().any(|c| normalize_code(c) == normalize_code(code))
        })
    };
    let region_ok = disclosed
        .admin1
        .as_deref()
        .map_or(true, |admin1| listed(&conditions.allowed_regions, admin1));
    Ok(listed(&conditions.allowed_countries, &disclosed.country) && region_ok)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::VeyKeypair;
    use crate::pid::{encode, NormalizedAddress, Pid, Precision};
    use crate::revocation::{RevocationEntry, RevocationList, RevocationReason, RevocationSubject};
    use crate::shipping::condition::{Dimensions, ParcelInfo};
    use crate::zkp::test_prover;
    use ark_bn254::Fr;
    use ark_ff::One;
    use chrono::Duration;

    fn tokyo() -> (Pid, NormalizedAddress) {
        let address = NormalizedAddress::new("JP").with_admin1("13").with_locality("SHIBUYA");
        (encode(&address, Precision::Locality).unwrap(), address)
    }

    fn conditions() -> ShippingCondition {
        ShippingCondition::default()
            .countries(["JP"])
            .max_weight_kg(30.0)
            .max_dimensions(Dimensions::cm(100.0, 60.0, 60.0))
    }

    fn proof() -> ZkProof {
        let (pid, address) = tokyo();
        let parcel = ParcelInfo::new(2.0, Some(Dimensions::cm(40.0, 30.0, 20.0)))
            .measure()
            .unwrap();
        test_prover()
            .prove(&pid, &address, &conditions(), &parcel, None)
            .unwrap()
    }

    #[test]
    fn valid_proof_verifies() {
        let result = verify(&proof(), test_prover().circuit(), &conditions());
        assert_eq!(result, VerificationResult::ok());
    }

    #[test]
    fn proof_bound_to_conditions() {
        let other = ShippingCondition::default().countries(["US"]);
        assert!(matches!(
            verify_proof(&proof(), test_prover().circuit(), &other),
            Err(ZkpError::ConditionMismatch)
        ));
    }

    #[test]
    fn swapped_conditions_fail_pairing_check() {
        // Rewriting the carried conditions (and digest) to match a different
        // request cannot move the proof onto it.
        let mut p = proof();
        let looser = ShippingCondition::default().countries(["JP"]).max_weight_kg(50.0);
        p.public_inputs.conditions = looser.clone();
        p.public_inputs.conditions_digest = fr_to_hex(&looser.digest().unwrap()).unwrap();
        assert!(matches!(
            verify_proof(&p, test_prover().circuit(), &looser),
            Err(ZkpError::InvalidProof)
        ));
    }

    #[test]
    fn proof_bound_to_pid() {
        let mut p = proof();
        p.public_inputs.pid = encode(&NormalizedAddress::new("JP").with_admin1("14"), Precision::Admin1).unwrap();
        assert!(matches!(
            verify_proof(&p, test_prover().circuit(), &conditions()),
            Err(ZkpError::InvalidProof)
        ));
    }

    #[test]
    fn proof_relabelled_to_foreign_pid_rejected() {
        // Claiming a US PID against a JP-only list fails before pairing.
        let mut p = proof();
        p.public_inputs.pid =
            encode(&NormalizedAddress::new("US").with_admin1("CA"), Precision::Admin1).unwrap();
        assert!(matches!(
            verify_proof(&p, test_prover().circuit(), &conditions()),
            Err(ZkpError::PidOutsideConditions)
        ));
    }

    #[test]
    fn pid_region_checked_against_region_list() {
        let (pid, address) = tokyo();
        let parcel = ParcelInfo::new(1.0, None).measure().unwrap();
        let kanto = ShippingCondition::default().regions(["13", "14"]);
        let p = test_prover().prove(&pid, &address, &kanto, &parcel, None).unwrap();
        assert!(verify(&p, test_prover().circuit(), &kanto).valid);

        let mut moved = p.clone();
        moved.public_inputs.pid =
            encode(&NormalizedAddress::new("JP").with_admin1("27"), Precision::Admin1).unwrap();
        assert!(matches!(
            verify_proof(&moved, test_prover().circuit(), &kanto),
            Err(ZkpError::PidOutsideConditions)
        ));
    }

    #[test]
    fn tampered_commitment_rejected() {
        let mut p = proof();
        let c = fr_from_hex(&p.public_inputs.address_commitment).unwrap() + Fr::one();
        p.public_inputs.address_commitment = fr_to_hex(&c).unwrap();
        assert!(!verify(&p, test_prover().circuit(), &conditions()).valid);
    }

    #[test]
    fn tampered_digest_rejected() {
        let mut p = proof();
        p.public_inputs.conditions_digest = fr_to_hex(&Fr::one()).unwrap();
        assert!(matches!(
            verify_proof(&p, test_prover().circuit(), &conditions()),
            Err(ZkpError::DigestMismatch)
        ));
    }

    #[test]
    fn wrong_circuit_rejected() {
        let mut circuit = test_prover().circuit().clone();
        circuit.id = "other-circuit".into();
        assert!(matches!(
            verify_proof(&proof(), &circuit, &conditions()),
            Err(ZkpError::CircuitMismatch { .. })
        ));
    }

    #[test]
    fn params_hash_mismatch_rejected() {
        let mut circuit = test_prover().circuit().clone();
        circuit.params_hash = hex::encode([0u8; 32]);
        assert!(matches!(
            verify_proof(&proof(), &circuit, &conditions()),
            Err(ZkpError::ParamsHashMismatch)
        ));
    }

    #[test]
    fn garbage_proof_rejected() {
        let mut p = proof();
        p.proof = "00".repeat(128);
        assert!(!verify(&p, test_prover().circuit(), &conditions()).valid);
        p.proof = "not hex".into();
        assert!(!verify(&p, test_prover().circuit(), &conditions()).valid);
    }

    fn view(entries: Vec<RevocationEntry>, at: chrono::DateTime<Utc>) -> RevocationView {
        let kp = VeyKeypair::generate();
        let list = RevocationList::sign(&kp, "did:key:reg".into(), at, entries).unwrap();
        RevocationView::new(list, kp.public_key()).unwrap()
    }

    #[test]
    fn fresh_check_passes_unrevoked() {
        let now = Utc::now();
        let result = verify_fresh(&proof(), test_prover().circuit(), &conditions(), &view(vec![], now), now);
        assert!(result.valid);
    }

    #[test]
    fn revocation_beats_valid_proof() {
        let now = Utc::now();
        let (pid, _) = tokyo();
        let entry = RevocationEntry {
            version: 1,
            subject: RevocationSubject::Pid(pid),
            reason: RevocationReason::UserRequest,
            revoked_at: now,
        };
        assert!(matches!(
            verify_proof_fresh(&proof(), test_prover().circuit(), &conditions(), &view(vec![entry], now), now),
            Err(ZkpError::Revocation(crate::revocation::RevocationError::Revoked { .. }))
        ));
    }

    #[test]
    fn stale_list_beats_valid_proof() {
        let published = Utc::now() - Duration::minutes(30);
        let result = verify_fresh(
            &proof(),
            test_prover().circuit(),
            &conditions(),
            &view(vec![], published),
            Utc::now(),
        );
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("stale"));
    }
}
