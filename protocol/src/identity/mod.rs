//! # Identity Module
//!
//! Address owners are identified by `did:key` DIDs derived from their
//! Ed25519 keys.
//!
//! 1. **DID** - `did:key` parsing and W3C DID document generation.
//! 2. **Registry** - persistent DID → document map, one document per holder.
//! 3. **Request** - API requests signed by a DID's key.
//!
//! ## Design Decisions
//!
//! - `did:key` over a registry-backed method: a verifier holding only the
//!   DID string can check the owner's consent signature.
//! - Key rotation is a new DID plus re-issued credentials. Documents are
//!   immutable once stored.

pub mod did;
pub mod registry;
pub mod request;

pub use did::{did_to_public_key, DidDocument, DidError, VerificationMethod, VeyDid};
pub use registry::DidRegistry;
pub use request::{RequestAuthError, SignedRequest};
