//! # Storage Module
//!
//! Persistent storage for every VEY store: the address vault, DIDs,
//! credentials, the revocation log, audit and tracking logs, and waybills.
//!
//! ## Design Decisions
//!
//! 1. **One sled database, many trees.** Every store gets its own keyspace
//!    but they share a single handle, so multi-tree transactions are
//!    available where a write must touch more than one tree atomically.
//!
//! 2. **Bincode for on-disk serialization.** JSON is for APIs and signing;
//!    bincode is for storage. Stored types therefore avoid serde attributes
//!    bincode cannot honor (internally tagged enums, skipped fields).
//!
//! 3. **Append-only where it matters.** Revocation, audit and tracking
//!    trees are only ever inserted into, never updated in place.

pub mod db;

pub use db::{DbError, DbResult, DbStats, VeyDB};
