//! Wire types: the public circuit descriptor, the proof envelope and the
//! verification result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pid::Pid;
use crate::shipping::condition::ShippingCondition;

/// Public, versioned description of a circuit. Everything a verifier
/// needs; nothing secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkCircuit {
    pub id: String,
    pub name: String,
    pub description: String,
    pub proof_type: String,
    pub version: String,
    /// Hex BLAKE3 of the verification key bytes.
    pub params_hash: String,
    /// Hex compressed Groth16 verification key.
    pub verification_key: String,
}

/// What a proof makes public. Never any address value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofPublicInputs {
    pub pid: Pid,
    pub conditions: ShippingCondition,
    /// Hex of the conditions digest field element.
    pub conditions_digest: String,
    /// Hex of the address commitment field element.
    pub address_commitment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkProof {
    pub circuit_id: String,
    pub proof_type: String,
    /// Hex compressed Groth16 proof.
    pub proof: String,
    pub public_inputs: ProofPublicInputs,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub prover: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl VerificationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            valid: false,
            error: Some(error.to_string()),
        }
    }
}
