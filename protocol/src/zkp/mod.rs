//! # Zero-Knowledge Shipping Proofs
//!
//! Groth16 over BN254. The prover (the address provider) shows that the
//! hidden address behind a PID is in the requester's allowed countries and
//! regions and that the parcel is within the weight and size limits,
//! without revealing the address.
//!
//! ## Architecture
//!
//! ```text
//! commitment.rs   - scalar-field address commitment, fixed generators
//! circuit.rs      - R1CS circuit (ShippingConditionCircuit), public input layout
//! prover.rs       - Groth16 setup and proving (ShippingProver)
//! verifier.rs     - pure verification (verify, verify_fresh)
//! types.rs        - ZkCircuit, ZkProof, VerificationResult
//! ```
//!
//! ## Security Model
//!
//! - **Soundness**: Groth16 knowledge-soundness in the generic group model.
//! - **Binding**: the PID, the conditions digest and every condition
//!   parameter are public inputs, so a proof verifies for exactly one
//!   (PID, conditions) pair. The hidden country (and admin1, when the PID
//!   shows it) must equal the PID's own.
//! - **Hiding**: country and region enter only through a commitment with a
//!   fresh random blinding per proof.
//! - **Range check**: 64-bit decomposition with boolean enforcement on
//!   every bit, no wrap-around.
//!
//! The setup is per-circuit and local to the node that generates it.

pub mod circuit;
pub mod commitment;
pub mod prover;
pub mod types;
pub mod verifier;

pub use circuit::ShippingConditionCircuit;
pub use commitment::CommitmentParams;
pub use prover::ShippingProver;
pub use types::{ProofPublicInputs, VerificationResult, ZkCircuit, ZkProof};
pub use verifier::{verify, verify_fresh, verify_proof, verify_proof_fresh};

use thiserror::Error;

use crate::pid::PidError;
use crate::revocation::RevocationError;
use crate::shipping::condition::ConditionError;
use crate::storage::DbError;

#[derive(Debug, Error)]
pub enum ZkpError {
    #[error("proof is for circuit {found}, expected {expected}")]
    CircuitMismatch { expected: String, found: String },

    #[error("unsupported proof type: {0}")]
    UnsupportedProofType(String),

    #[error("verification key does not match the circuit params hash")]
    ParamsHashMismatch,

    #[error("proof conditions differ from the requested conditions")]
    ConditionMismatch,

    #[error("conditions digest mismatch")]
    DigestMismatch,

    /// The PID's own country or admin1 is outside the requested lists.
    #[error("PID lies outside the requested conditions")]
    PidOutsideConditions,

    /// The address handed to the prover is not the one behind the PID.
    #[error("address does not match the PID")]
    AddressMismatch,

    #[error("proof verification failed")]
    InvalidProof,

    /// Deliberately says nothing about which condition failed.
    #[error("conditions not met")]
    Unsatisfied,

    #[error("malformed {0}")]
    Malformed(String),

    #[error("constraint synthesis failed: {0}")]
    Synthesis(String),

    #[error(transparent)]
    Pid(#[from] PidError),

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    Revocation(#[from] RevocationError),

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

/// One proving key for the whole test binary; setup dominates test time.
#[cfg(test)]
pub(crate) fn test_prover() -> &'static ShippingProver {
    use ark_std::rand::{rngs::StdRng, SeedableRng};
    use std::sync::OnceLock;

    static PROVER: OnceLock<ShippingProver> = OnceLock::new();
    PROVER.get_or_init(|| {
        let mut rng = StdRng::seed_from_u64(42);
        ShippingProver::setup(&mut rng).unwrap()
    })
}
