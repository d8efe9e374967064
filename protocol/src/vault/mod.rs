//! # Vault Module: Sealed Address Records
//!
//! The vault is the only place a literal address exists at rest. Every
//! other component sees a PID.
//!
//! ## Architecture
//!
//! ```text
//! address.rs  - AddressVault: register / open / owner, collision suffixes
//! ```
//!
//! ## Design Principles
//!
//! 1. **Sealed, and bound to the PID.** Records are AES-256-GCM
//!    ciphertext with the PID as AAD. A record moved to another key
//!    fails to open.
//!
//! 2. **Full address inside, truncated address outside.** The sealed
//!    record keeps building and unit. The PID never does.
//!
//! 3. **Insert-only.** Registration uses compare-and-swap on an empty slot,
//!    so two concurrent registrations of colliding addresses end up with
//!    distinct suffixes instead of overwriting each other.

pub mod address;

pub use address::{AddressRecord, AddressVault, VaultError};
