use notary_ledger::LedgerError;
use notary_types::{AccountId, RegistrationId, RegistrationStatus};

use crate::network::NetworkError;

/// Errors from the anchoring pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("registration {0} not found")]
    NotFound(RegistrationId),

    #[error("registration {registration} is not owned by {principal}")]
    NotOwner {
        registration: RegistrationId,
        principal: AccountId,
    },

    #[error("registration {0} already exists with a different fingerprint")]
    FingerprintConflict(RegistrationId),

    #[error("illegal transition for {id}: {from} → {to}")]
    IllegalTransition {
        id: RegistrationId,
        from: RegistrationStatus,
        to: RegistrationStatus,
    },

    #[error("registration {id} is {status}; only FAILED registrations can be retried")]
    NotRetryable {
        id: RegistrationId,
        status: RegistrationStatus,
    },

    #[error("registration {id} is {status}; certificates exist only for CONFIRMED registrations")]
    NotConfirmed {
        id: RegistrationId,
        status: RegistrationStatus,
    },

    #[error("confirmed registration {0} has no anchoring proof")]
    MissingProof(RegistrationId),

    #[error("credit ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("anchoring network: {0}")]
    Network(#[from] NetworkError),

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

pub type AnchorResult<T> = Result<T, AnchorError>;
