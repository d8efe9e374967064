//! # Hashing Utilities
//!
//! BLAKE3 everywhere. It backs:
//!
//! - the revocation list's Merkle root;
//! - the circuit `params_hash`;
//! - the per-requester `pidToken` (keyed mode);
//! - commitment generator derivation (derive-key mode);
//! - the map from strings (PIDs, country codes, condition digests) into the
//!   BN254 scalar field.
//!
//! ## hash_to_field
//!
//! Hash with BLAKE3, then reduce modulo the field order. The output is
//! 256 bits and the BN254 scalar modulus is ~2^254, so the reduction bias is
//! negligible for our purposes.

use ark_bn254::Fr;
use ark_ff::PrimeField;

/// BLAKE3 digest of `data`.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash several byte slices as if concatenated, without the allocation.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Keyed BLAKE3 (a PRF). Used where the output must be unpredictable to
/// anyone without `key`.
pub fn keyed_hash(key: &[u8; 32], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_keyed(key);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// BLAKE3 derive-key mode. Different contexts never collide, even for the
/// same `data`.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Map arbitrary bytes to a BN254 scalar.
pub fn hash_to_field(data: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(&blake3_hash(data))
}

/// `hash_to_field(tag || data)`. Every value entering the shipping circuit
/// goes through this with its own tag, so a country code and a region code
/// with the same spelling map to different field elements.
pub fn tagged_field(tag: &[u8], data: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(&blake3_hash_multi(&[tag, data]))
}

/// Binary BLAKE3 Merkle root. Odd levels duplicate their last node; an
/// empty list yields all zeros. Entries in a revocation list are unique by
/// version, so the duplicated-leaf ambiguity never arises.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    if leaves.len() == 1 {
        return blake3_hash_multi(&[leaves[0].as_slice(), leaves[0].as_slice()]);
    }

    let mut level: Vec<[u8; 32]> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&pair[0]);
                blake3_hash_multi(&[pair[0].as_slice(), right.as_slice()])
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake3_deterministic() {
        assert_eq!(blake3_hash(b"vey"), blake3_hash(b"vey"));
        assert_ne!(blake3_hash(b"vey"), blake3_hash(b"Vey"));
    }

    #[test]
    fn multi_equals_concatenation() {
        assert_eq!(
            blake3_hash_multi(&[b"hello", b" world"]),
            blake3_hash(b"hello world")
        );
    }

    #[test]
    fn keyed_hash_depends_on_key() {
        let a = keyed_hash(&[1u8; 32], &[b"pid", b"merchant"]);
        let b = keyed_hash(&[2u8; 32], &[b"pid", b"merchant"]);
        assert_ne!(a, b);
        assert_ne!(a, blake3_hash(b"pidmerchant"));
    }

    #[test]
    fn domain_separation() {
        assert_ne!(
            domain_separated_hash("context-a", b"same"),
            domain_separated_hash("context-b", b"same")
        );
    }

    #[test]
    fn tagged_field_separates_domains() {
        assert_ne!(tagged_field(b"country:", b"13"), tagged_field(b"region:", b"13"));
        assert_eq!(tagged_field(b"country:", b"JP"), hash_to_field(b"country:JP"));
    }

    #[test]
    fn merkle_root_shapes() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);

        let leaf = blake3_hash(b"only");
        assert_eq!(
            merkle_root(&[leaf]),
            blake3_hash_multi(&[leaf.as_slice(), leaf.as_slice()])
        );

        let l = blake3_hash(b"left");
        let r = blake3_hash(b"right");
        assert_eq!(merkle_root(&[l, r]), blake3_hash_multi(&[l.as_slice(), r.as_slice()]));
        assert_ne!(merkle_root(&[l, r]), merkle_root(&[r, l]));
    }

    #[test]
    fn merkle_root_odd_count() {
        let leaves: Vec<[u8; 32]> = (0..3u8).map(|i| blake3_hash(&[i])).collect();
        let ab = blake3_hash_multi(&[leaves[0].as_slice(), leaves[1].as_slice()]);
        let cc = blake3_hash_multi(&[leaves[2].as_slice(), leaves[2].as_slice()]);
        let expected = blake3_hash_multi(&[ab.as_slice(), cc.as_slice()]);
        assert_eq!(merkle_root(&leaves), expected);
    }
}
