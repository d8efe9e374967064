//! # Address Commitment over the BN254 Scalar Field
//!
//! The proof binds the hidden address values to the PID through a
//! scalar-field Pedersen-style commitment:
//!
//! ```text
//! c = country · g_country + region · g_region + pid_binding · g_pid + r · h   (mod p)
//! ```
//!
//! `country` and `region` are tagged hashes of the codes, `pid_binding` is
//! the tagged hash of the PID string and `r` is a fresh random blinding per
//! proof. Native Fr arithmetic keeps the in-circuit check to a handful of
//! linear terms.
//!
//! The generators are derived with BLAKE3 in derive-key mode from fixed
//! labels, so every party computes the same ones and nobody chose them.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use super::ZkpError;
use crate::config::DOMAIN_COMMITMENT;
use crate::crypto::hash::domain_separated_hash;

/// Scalar generators baked into the shipping circuit as constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitmentParams {
    pub g_country: Fr,
    pub g_region: Fr,
    pub g_pid: Fr,
    pub h: Fr,
}

impl CommitmentParams {
    /// The protocol's fixed generators.
    pub fn derive() -> Self {
        Self {
            g_country: generator(b"g_country"),
            g_region: generator(b"g_region"),
            g_pid: generator(b"g_pid"),
            h: generator(b"h"),
        }
    }

    /// `c` for the given opening.
    pub fn commit(&self, country: Fr, region: Fr, pid_binding: Fr, blinding: Fr) -> Fr {
        country * self.g_country + region * self.g_region + pid_binding * self.g_pid + blinding * self.h
    }
}

impl Default for CommitmentParams {
    fn default() -> Self {
        Self::derive()
    }
}

fn generator(label: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(&domain_separated_hash(DOMAIN_COMMITMENT, label))
}

/// Compressed hex of a field element.
pub fn fr_to_hex(value: &Fr) -> Result<String, ZkpError> {
    let mut buf = Vec::with_capacity(32);
    value
        .serialize_compressed(&mut buf)
        .map_err(|e| ZkpError::Malformed(format!("field element: {e}")))?;
    Ok(hex::encode(buf))
}

/// Inverse of [`fr_to_hex`]. Non-canonical encodings are rejected.
pub fn fr_from_hex(s: &str) -> Result<Fr, ZkpError> {
    let bytes = hex::decode(s).map_err(|e| ZkpError::Malformed(format!("field element hex: {e}")))?;
    Fr::deserialize_compressed(&bytes[..])
        .map_err(|e| ZkpError::Malformed(format!("field element: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;
    use ark_std::rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn generators_are_fixed_and_distinct() {
        let a = CommitmentParams::derive();
        let b = CommitmentParams::derive();
        assert_eq!(a, b);
        let gens = [a.g_country, a.g_region, a.g_pid, a.h];
        for i in 0..gens.len() {
            for j in i + 1..gens.len() {
                assert_ne!(gens[i], gens[j]);
            }
        }
    }

    #[test]
    fn blinding_hides_the_opening() {
        let mut rng = StdRng::seed_from_u64(42);
        let params = CommitmentParams::derive();
        let (c, r, p) = (Fr::from(1u64), Fr::from(2u64), Fr::from(3u64));
        let one = params.commit(c, r, p, Fr::rand(&mut rng));
        let two = params.commit(c, r, p, Fr::rand(&mut rng));
        assert_ne!(one, two);
    }

    #[test]
    fn commitment_binds_each_value() {
        let params = CommitmentParams::derive();
        let blinding = Fr::from(99u64);
        let base = params.commit(Fr::from(1u64), Fr::from(2u64), Fr::from(3u64), blinding);
        assert_ne!(base, params.commit(Fr::from(4u64), Fr::from(2u64), Fr::from(3u64), blinding));
        assert_ne!(base, params.commit(Fr::from(1u64), Fr::from(4u64), Fr::from(3u64), blinding));
        assert_ne!(base, params.commit(Fr::from(1u64), Fr::from(2u64), Fr::from(4u64), blinding));
    }

    #[test]
    fn hex_roundtrip() {
        let mut rng = StdRng::seed_from_u64(7);
        let x = Fr::rand(&mut rng);
        let s = fr_to_hex(&x).unwrap();
        assert_eq!(s.len(), 64);
        assert_eq!(fr_from_hex(&s).unwrap(), x);
        assert!(fr_from_hex("zz").is_err());
        assert!(fr_from_hex(&"ff".repeat(32)).is_err());
    }
}
