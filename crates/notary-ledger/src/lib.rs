//! Credit accounting for Notary.
//!
//! The credit ledger is the source of truth for entitlement; the balance
//! cache is a disposable projection of it. This crate provides:
//! - `LedgerEntry` records with per-account sequence numbers and hash links
//! - `CreditLedger` / `BalanceCache` trait boundaries
//! - In-memory implementations for tests and embedding
//! - `CreditAccounting`: idempotent consume, refund, grant, and reconcile
//! - Stream validation (hash chain, sequence, balance arithmetic)
//! - Balance change notifications

pub mod accounting;
pub mod balance;
pub mod entry;
pub mod error;
pub mod events;
pub mod memory;
pub mod traits;
pub mod validation;

pub use accounting::{
    ConsumeOutcome, CreditAccounting, CreditConsumer, GrantOutcome, ReconcileReport,
    RefundOutcome, MAX_CAS_ATTEMPTS,
};
pub use balance::{BalanceProjection, BalanceRow};
pub use entry::{EntryDraft, LedgerEntry, Reference};
pub use error::LedgerError;
pub use events::{BalanceChange, BalanceEvent, BalanceEvents};
pub use memory::{InMemoryBalanceCache, InMemoryCreditLedger};
pub use traits::{BalanceCache, CreditLedger};
pub use validation::{StreamValidator, ValidationReport, Violation, ViolationKind};
