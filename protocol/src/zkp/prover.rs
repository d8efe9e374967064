//! # Groth16 Proof Generation
//!
//! 1. **Setup.** `ShippingProver::setup(rng)` runs the circuit-specific
//!    Groth16 setup once. The node persists the proving key in sled
//!    metadata (`load_or_setup`) so proofs survive restarts and the
//!    published circuit descriptor stays stable.
//! 2. **Prove.** `prove` evaluates the conditions natively first. Only a
//!    satisfied statement reaches `Groth16::prove`; an unsatisfied one is
//!    rejected without touching the SNARK.
//! 3. The resulting [`ZkProof`] carries the hex proof, the PID, the exact
//!    conditions and the address commitment. Nothing else.

use ark_bn254::{Bn254, Fr};
use ark_ff::UniformRand;
use ark_groth16::{Groth16, ProvingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, RngCore};
use chrono::Utc;
use tracing::{debug, info};

use super::circuit::{
    country_value, pid_binding, region_value, PublicInputs, ShippingConditionCircuit, Witness,
};
use super::commitment::{fr_to_hex, CommitmentParams};
use super::types::{ProofPublicInputs, ZkCircuit, ZkProof};
use super::ZkpError;
use crate::config::{PROOF_TYPE, SHIPPING_CIRCUIT_ID, SHIPPING_CIRCUIT_VERSION};
use crate::crypto::hash::blake3_hash;
use crate::pid::{NormalizedAddress, Pid};
use crate::shipping::condition::{normalize_code, Measurement, ShippingCondition};
use crate::storage::VeyDB;

const META_PROVING_KEY: &str = "zkp_proving_key";

// ---------------------------------------------------------------------------
// ShippingProver
// ---------------------------------------------------------------------------

/// Holds the Groth16 proving key for the shipping-condition circuit.
///
/// Large but immutable; keep one per process and share it.
pub struct ShippingProver {
    pk: ProvingKey<Bn254>,
    params: CommitmentParams,
    circuit: ZkCircuit,
}

impl std::fmt::Debug for ShippingProver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingProver")
            .field("circuit", &self.circuit.id)
            .field("params_hash", &self.circuit.params_hash)
            .finish()
    }
}

impl ShippingProver {
    /// Run the Groth16 setup for the circuit.
    pub fn setup<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, ZkpError> {
        let params = CommitmentParams::derive();
        let (pk, _vk) =
            Groth16::<Bn254>::circuit_specific_setup(ShippingConditionCircuit::blank(params), rng)
                .map_err(|e| ZkpError::Synthesis(e.to_string()))?;
        Self::from_proving_key(pk)
    }

    fn from_proving_key(pk: ProvingKey<Bn254>) -> Result<Self, ZkpError> {
        let mut vk_bytes = Vec::new();
        pk.vk
            .serialize_compressed(&mut vk_bytes)
            .map_err(|e| ZkpError::Malformed(format!("verification key: {e}")))?;
        let circuit = ZkCircuit {
            id: SHIPPING_CIRCUIT_ID.to_string(),
            name: "Shipping condition".to_string(),
            description: "Proves that a committed address lies in the allowed countries and \
                          regions and that the parcel is within the weight and size limits"
                .to_string(),
            proof_type: PROOF_TYPE.to_string(),
            version: SHIPPING_CIRCUIT_VERSION.to_string(),
            params_hash: hex::encode(blake3_hash(&vk_bytes)),
            verification_key: hex::encode(&vk_bytes),
        };
        Ok(Self {
            pk,
            params: CommitmentParams::derive(),
            circuit,
        })
    }

    /// Compressed proving key, for persistence.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ZkpError> {
        let mut buf = Vec::new();
        self.pk
            .serialize_compressed(&mut buf)
            .map_err(|e| ZkpError::Malformed(format!("proving key: {e}")))?;
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ZkpError> {
        let pk = ProvingKey::<Bn254>::deserialize_compressed(data)
            .map_err(|e| ZkpError::Malformed(format!("proving key: {e}")))?;
        Self::from_proving_key(pk)
    }

    /// Load the proving key from `db`, running setup and storing the
    /// result on first use.
    pub fn load_or_setup(db: &VeyDB) -> Result<Self, ZkpError> {
        if let Some(bytes) = db.get_meta(META_PROVING_KEY)? {
            let prover = Self::from_bytes(&bytes)?;
            debug!(params_hash = %prover.circuit.params_hash, "loaded proving key");
            return Ok(prover);
        }
        let prover = Self::setup(&mut ark_std::rand::thread_rng())?;
        db.put_meta(META_PROVING_KEY, &prover.to_bytes()?)?;
        db.flush()?;
        info!(params_hash = %prover.circuit.params_hash, "generated and stored proving key");
        Ok(prover)
    }

    /// The public descriptor verifiers check proofs against.
    pub fn circuit(&self) -> &ZkCircuit {
        &self.circuit
    }

    /// Prove that `address` (behind `pid`) and `parcel` satisfy
    /// `conditions`.
    ///
    /// # Errors
    ///
    /// [`ZkpError::Unsatisfied`] when any predicate fails. The error says
    /// nothing about which one. [`ZkpError::AddressMismatch`] when `address`
    /// is not in the country (or admin1) the PID names.
    pub fn prove(
        &self,
        pid: &Pid,
        address: &NormalizedAddress,
        conditions: &ShippingCondition,
        parcel: &Measurement,
        prover_id: Option<&str>,
    ) -> Result<ZkProof, ZkpError> {
        let disclosed = pid.decode()?;
        if disclosed.country != normalize_code(&address.country)
            || disclosed.admin1.as_deref().is_some_and(|a| {
                address.admin1.as_deref().map(normalize_code).as_deref() != Some(a)
            })
        {
            return Err(ZkpError::AddressMismatch);
        }
        if !conditions.evaluate(address, parcel)? {
            return Err(ZkpError::Unsatisfied);
        }

        let mut rng = ark_std::rand::thread_rng();
        let witness = Witness {
            country: country_value(address),
            region: region_value(address),
            blinding: Fr::rand(&mut rng),
            parcel: *parcel,
        };
        let commitment = self.params.commit(
            witness.country,
            witness.region,
            pid_binding(pid),
            witness.blinding,
        );
        let public = PublicInputs::new(pid, conditions, commitment)?;
        let conditions_digest = fr_to_hex(&public.conditions_digest)?;

        let circuit = ShippingConditionCircuit::new(self.params, public, witness);
        let proof = Groth16::<Bn254>::prove(&self.pk, circuit, &mut rng)
            .map_err(|e| ZkpError::Synthesis(e.to_string()))?;

        let mut proof_bytes = Vec::new();
        proof
            .serialize_compressed(&mut proof_bytes)
            .map_err(|e| ZkpError::Malformed(format!("proof: {e}")))?;

        info!(%pid, circuit = %self.circuit.id, "generated shipping proof");
        Ok(ZkProof {
            circuit_id: self.circuit.id.clone(),
            proof_type: self.circuit.proof_type.clone(),
            proof: hex::encode(proof_bytes),
            public_inputs: ProofPublicInputs {
                pid: pid.clone(),
                conditions: conditions.clone(),
                conditions_digest,
                address_commitment: fr_to_hex(&commitment)?,
            },
            timestamp: Utc::now(),
            prover: prover_id.map(str::to_string),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
