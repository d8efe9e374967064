//! # Resolver Module: Policy-Gated Address Resolution
//!
//! Carriers and locker operators sometimes need the real address. They get
//! it here, and only here, under a role policy and with an audit record
//! that is durable before the address leaves the vault.
//!
//! ## Architecture
//!
//! ```text
//! policy.rs   - AccessControlPolicy, Requester, Action, authorize()
//! audit.rs    - AuditSink trait, SledAuditLog, AuditLogEntry
//! resolve.rs  - Resolver: resolve / track_event / history
//! ```

pub mod audit;
pub mod policy;
pub mod resolve;

pub use audit::{AuditError, AuditLogEntry, AuditResult, AuditSink, SledAuditLog};
pub use policy::{authorize, AccessControlPolicy, Action, Requester};
pub use resolve::{ResolveError, Resolver};
