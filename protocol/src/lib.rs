// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # VEY Protocol: Core Library
//!
//! Private address identifiers for shipping. A holder registers an address
//! once and gets a PID: a hierarchical, versioned, checksummed identifier
//! that names a region, never a door. Shops ask for a zero-knowledge proof
//! that the hidden address satisfies their shipping conditions. Carriers
//! resolve the real address only under policy, and only after an audit
//! record is durable.
//!
//! ## Architecture
//!
//! - **pid** - PID codec, precision levels, hierarchy patterns.
//! - **vault** - AES-256-GCM sealed PID → address records.
//! - **crypto** - Ed25519 keys and signatures, BLAKE3, AES-GCM.
//! - **identity** - `did:key` identities and the DID registry.
//! - **credential** - Signed address credentials binding a DID to a PID.
//! - **revocation** - Versioned, signed revocation list and its consumers.
//! - **zkp** - Groth16 shipping-condition circuit, prover and verifier.
//! - **shipping** - Conditions, validation, waybills, tracking.
//! - **resolver** - Policy-gated, audited PID → address resolution.
//! - **provider** - The operator façade tying the stores together.
//! - **storage** - sled-backed persistence.
//! - **config** - Protocol constants.
//! - **error** - The crate-wide error taxonomy.
//!
//! ## Design Philosophy
//!
//! 1. Fail closed. A missing signature, a stale list or a failed audit write
//!    is a refusal, never a degraded success.
//! 2. No literal address outside the vault, the resolver's return value and
//!    the prover's private witness. Not in logs, not in errors.
//! 3. Registries are append-only with monotonic versions.

pub mod config;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod pid;
pub mod provider;
pub mod resolver;
pub mod revocation;
pub mod shipping;
pub mod storage;
pub mod vault;
pub mod zkp;

pub use error::VeyError;
pub use pid::{NormalizedAddress, Pid, Precision};
pub use provider::{AddressProvider, ProviderSecrets, Registration};
