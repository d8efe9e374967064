//! # Cryptographic Primitives for VEY
//!
//! Every signature, hash and sealed address record flows through here.
//! Boring, well-audited building blocks only:
//!
//! - **Ed25519** for credentials, revocation lists and user consent.
//! - **AES-256-GCM** for address records at rest.
//! - **BLAKE3** for digests, keyed tokens and field hashing.
//!
//! Everything is a thin, typed wrapper around audited implementations.

pub mod encryption;
pub mod hash;
pub mod keys;
pub mod signatures;

pub use encryption::{open, seal};
pub use hash::{blake3_hash, hash_to_field, keyed_hash, merkle_root};
pub use keys::{VeyKeypair, VeyPublicKey, VeySignature};
pub use signatures::{sign, sign_canonical, verify, verify_canonical};
