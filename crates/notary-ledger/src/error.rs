use notary_types::{AccountId, CreditOperation};

/// Errors produced by credit ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient balance for {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        available: u64,
        requested: u64,
    },

    #[error("amount must be positive")]
    ZeroAmount,

    #[error("ledger tail moved: expected seq {expected}, found {actual}")]
    TailMoved { expected: u64, actual: u64 },

    #[error("{operation} already recorded for reference {reference_id}")]
    DuplicateReference {
        operation: CreditOperation,
        reference_id: String,
    },

    #[error("no consumption recorded for reference {0}")]
    ReferenceNotConsumed(String),

    #[error("balance cache version conflict: expected {expected:?}, found {found:?}")]
    VersionConflict {
        expected: Option<u64>,
        found: Option<u64>,
    },

    #[error("refusing to regress balance cache from seq {cached_seq} to seq {offered_seq}")]
    StaleProjection { cached_seq: u64, offered_seq: u64 },

    #[error("integrity violation at seq {seq}: {reason}")]
    IntegrityViolation { seq: u64, reason: String },

    #[error("gave up on {account} after {attempts} contended attempts")]
    Contention { account: AccountId, attempts: usize },

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

impl LedgerError {
    /// Errors that a fresh read-then-write attempt may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TailMoved { .. } | Self::VersionConflict { .. } | Self::StaleProjection { .. }
        )
    }
}
