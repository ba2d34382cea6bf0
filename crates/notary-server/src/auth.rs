//! Principal extraction.
//!
//! The bearer token *is* the account id; a token of the form
//! `admin:<name>` authenticates an administrator. Real credential checks
//! belong to whatever sits in front of this server.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use notary_types::AccountId;

use crate::error::ApiError;
use crate::state::AppState;

const ADMIN_PREFIX: &str = "admin:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub account: AccountId,
    pub is_admin: bool,
}

impl Identity {
    pub fn user(account: AccountId) -> Self {
        Self { account, is_admin: false }
    }

    pub fn admin(account: AccountId) -> Self {
        Self { account, is_admin: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    pub fn from_parts(parts: &Parts) -> Result<Self, ApiError> {
        let Some(value) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Self::Anonymous);
        };
        let value = value
            .to_str()
            .map_err(|_| ApiError::BadRequest("authorization header is not valid text".into()))?;
        match value.strip_prefix("Bearer ") {
            Some(token) => Ok(Self::Bearer(token.trim().to_string())),
            None => Err(ApiError::BadRequest("expected a bearer token".into())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Register,
    ReadCertificate,
    ReadBalance,
    Reconcile { account: AccountId },
    Grant,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register => write!(f, "register"),
            Self::ReadCertificate => write!(f, "read-certificate"),
            Self::ReadBalance => write!(f, "read-balance"),
            Self::Reconcile { account } => write!(f, "reconcile:{account}"),
            Self::Grant => write!(f, "grant"),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, ApiError>;
    async fn authorize(&self, identity: &Identity, action: &Action) -> bool;
}

/// Treats the bearer token as the account id.
pub struct BearerAuth;

#[async_trait]
impl AuthProvider for BearerAuth {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, ApiError> {
        let Credentials::Bearer(token) = credentials else {
            return Err(ApiError::Unauthenticated);
        };
        let (name, is_admin) = match token.strip_prefix(ADMIN_PREFIX) {
            Some(name) => (name, true),
            None => (token.as_str(), false),
        };
        let account = AccountId::new(name).map_err(|_| ApiError::Unauthenticated)?;
        Ok(if is_admin {
            Identity::admin(account)
        } else {
            Identity::user(account)
        })
    }

    async fn authorize(&self, identity: &Identity, action: &Action) -> bool {
        match action {
            Action::Grant => identity.is_admin,
            Action::Reconcile { account } => identity.is_admin || *account == identity.account,
            Action::Register | Action::ReadCertificate | Action::ReadBalance => true,
        }
    }
}

/// Extractor for an authenticated principal. Rejects anonymous requests.
#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credentials = Credentials::from_parts(parts)?;
        let identity = state.auth().authenticate(&credentials).await?;
        state.on_authenticated(&identity);
        Ok(identity)
    }
}

/// Check `action` for `identity`, or fail with 403.
pub async fn require(state: &AppState, identity: &Identity, action: Action) -> Result<(), ApiError> {
    if state.auth().authorize(identity, &action).await {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "{} may not perform {action}",
            identity.account
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> AccountId {
        AccountId::new(name).unwrap()
    }

    #[tokio::test]
    async fn bearer_token_is_the_account() {
        let id = BearerAuth
            .authenticate(&Credentials::Bearer("alice".into()))
            .await
            .unwrap();
        assert_eq!(id, Identity::user(account("alice")));
    }

    #[tokio::test]
    async fn admin_prefix_marks_admin() {
        let id = BearerAuth
            .authenticate(&Credentials::Bearer("admin:ops".into()))
            .await
            .unwrap();
        assert!(id.is_admin);
        assert_eq!(id.account, account("ops"));
    }

    #[tokio::test]
    async fn anonymous_and_empty_tokens_are_rejected() {
        assert!(matches!(
            BearerAuth.authenticate(&Credentials::Anonymous).await,
            Err(ApiError::Unauthenticated)
        ));
        assert!(BearerAuth
            .authenticate(&Credentials::Bearer("admin:".into()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn grants_need_admin() {
        let user = Identity::user(account("alice"));
        let admin = Identity::admin(account("ops"));
        assert!(!BearerAuth.authorize(&user, &Action::Grant).await);
        assert!(BearerAuth.authorize(&admin, &Action::Grant).await);
    }

    #[tokio::test]
    async fn reconcile_own_account_only() {
        let user = Identity::user(account("alice"));
        assert!(BearerAuth.authorize(&user, &Action::Reconcile { account: account("alice") }).await);
        assert!(!BearerAuth.authorize(&user, &Action::Reconcile { account: account("bob") }).await);
    }

    #[test]
    fn action_display() {
        assert_eq!(Action::Reconcile { account: account("a") }.to_string(), "reconcile:a");
        assert_eq!(Action::Grant.to_string(), "grant");
    }
}
