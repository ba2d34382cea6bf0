//! Foundation types for Notary.
//!
//! This crate provides the identity, content-addressing, and lifecycle types
//! shared by every other Notary crate, plus the wire DTOs exchanged between
//! the server and its clients.
//!
//! # Key Types
//!
//! - [`Fingerprint`]: 256-bit content digest, rendered as 64 lowercase hex characters
//! - [`AccountId`]: authenticated principal owning credits and registrations
//! - [`RegistrationId`] / [`LedgerEntryId`]: UUID v7 identifiers
//! - [`RegistrationStatus`]: the four-state anchoring lifecycle
//! - [`CreditOperation`]: balance-affecting ledger operations
//! - [`Clock`]: injectable wall clock

pub mod api;
pub mod clock;
pub mod error;
pub mod fingerprint;
pub mod ids;
pub mod operation;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TypeError;
pub use fingerprint::{Fingerprint, FINGERPRINT_HEX_LEN};
pub use ids::{AccountId, LedgerEntryId, RegistrationId};
pub use operation::CreditOperation;
pub use status::RegistrationStatus;
