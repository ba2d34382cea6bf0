use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use notary_anchor::AnchorError;
use notary_ledger::LedgerError;
use notary_verify::VerifyError;
use serde_json::json;
use thiserror::Error;

/// Errors from building and running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Error returned by a request handler.
///
/// Rendered as `{ "error": { "code", "message" } }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PaymentRequired(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "invalid_request",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::PaymentRequired(_) => "insufficient_balance",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance { .. } => Self::PaymentRequired(e.to_string()),
            LedgerError::ZeroAmount => Self::BadRequest(e.to_string()),
            LedgerError::ReferenceNotConsumed(_) | LedgerError::DuplicateReference { .. } => {
                Self::Conflict(e.to_string())
            }
            LedgerError::Contention { .. } => Self::Unavailable(e.to_string()),
            _ => Self::Internal(e.to_string()),
        }
    }
}

impl From<AnchorError> for ApiError {
    fn from(e: AnchorError) -> Self {
        match e {
            AnchorError::NotFound(_) => Self::NotFound(e.to_string()),
            // Foreign registrations look absent to the caller.
            AnchorError::NotOwner { registration, .. } => {
                Self::NotFound(format!("registration {registration} not found"))
            }
            AnchorError::FingerprintConflict(_)
            | AnchorError::NotRetryable { .. }
            | AnchorError::NotConfirmed { .. }
            | AnchorError::IllegalTransition { .. } => Self::Conflict(e.to_string()),
            AnchorError::Ledger(inner) => inner.into(),
            AnchorError::Network(_) => Self::Unavailable(e.to_string()),
            AnchorError::MissingProof(_) | AnchorError::LockPoisoned(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<VerifyError> for ApiError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Lookup(inner) => inner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_types::{AccountId, RegistrationId};

    #[test]
    fn insufficient_balance_maps_to_402() {
        let err: ApiError = LedgerError::InsufficientBalance {
            account: AccountId::new("a").unwrap(),
            available: 0,
            requested: 1,
        }
        .into();
        assert_eq!(err.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.code(), "insufficient_balance");
    }

    #[test]
    fn foreign_registration_looks_missing() {
        let id = RegistrationId::new();
        let err: ApiError = AnchorError::NotOwner {
            registration: id,
            principal: AccountId::new("mallory").unwrap(),
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(!err.to_string().contains("mallory"));
    }

    #[test]
    fn wrapped_ledger_error_keeps_mapping() {
        let err: ApiError = AnchorError::Ledger(LedgerError::ZeroAmount).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
