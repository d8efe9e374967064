//! # PID: Privacy-Bounded Address Identifiers
//!
//! A PID is the only handle the outside world ever gets for an address.
//! It is computed from a [`NormalizedAddress`] truncated to a
//! [`Precision`] and has four properties:
//!
//! - **Deterministic.** Same truncated address, same PID.
//! - **Country-namespaced.** The bech32 HRP is the country code.
//! - **Bounded.** Building and unit never enter a PID. They live only in
//!   the sealed vault record.
//! - **Versioned.** A codec version byte is part of every payload, and the
//!   decoder keeps a list of versions it still understands.
//!
//! ## Architecture
//!
//! ```text
//! address.rs  - NormalizedAddress, Precision, shape validation
//! codec.rs    - Pid, encode / decode / inspect (bech32)
//! pattern.rs  - ResourcePattern, hierarchy helpers
//! ```

pub mod address;
pub mod codec;
pub mod pattern;

pub use address::{NormalizedAddress, Precision};
pub use codec::{decode, encode, encode_with_collision, inspect, DecodedPid, Pid};
pub use pattern::{is_parent_of, ResourcePattern};

use thiserror::Error;

/// PID codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PidError {
    /// A component is missing or has the wrong shape.
    #[error("invalid component {field}: {reason}")]
    InvalidComponent { field: String, reason: String },

    /// The PID carries a codec version this build cannot read.
    #[error("unknown PID codec version {0}")]
    UnknownVersion(u8),

    /// Checksum failure or structurally broken payload.
    #[error("malformed PID: {0}")]
    Malformed(String),

    /// Collision suffixes run from 1 to 99.
    #[error("collision suffix {0} out of range")]
    InvalidCollision(u8),
}
