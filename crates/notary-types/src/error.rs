use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown registration status: {0}")]
    UnknownStatus(String),

    #[error("unknown credit operation: {0}")]
    UnknownOperation(String),
}
