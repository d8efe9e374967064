//! # Revocation: Signed, Versioned, Append-Only
//!
//! Revoked PIDs and credentials must stop validating promptly. This module
//! has two halves:
//!
//! - **Producer.** [`RevocationRegistry`] is the only writer. Every
//!   `revoke` appends exactly one entry and bumps the version by one.
//!   `publish` signs the whole log as a [`RevocationList`].
//! - **Consumer.** [`RevocationView`] holds a verified list and refuses to
//!   answer once it is older than the configured staleness (10 minutes by
//!   default). [`RevocationCache`] shares one view across handlers and
//!   refetches lazily.
//!
//! ## Architecture
//!
//! ```text
//! list.rs      - RevocationEntry, RevocationReason, RevocationList (signed)
//! registry.rs  - RevocationRegistry over sled transactions
//! view.rs      - RevocationView, RevocationCache
//! error.rs     - RevocationError
//! ```

pub mod error;
pub mod list;
pub mod registry;
pub mod view;

pub use error::RevocationError;
pub use list::{RevocationEntry, RevocationList, RevocationReason, RevocationSubject};
pub use registry::RevocationRegistry;
pub use view::{RevocationCache, RevocationView};
