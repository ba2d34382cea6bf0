use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use notary_anchor::{AnchorNetwork, Certificate, SubmitRequest};
use notary_ledger::GrantOutcome;
use notary_types::api::{
    BalanceResponse, GrantCreditsRequest, HealthResponse, ReconcileResponse,
    RegistrationStatusResponse, SubmitRegistrationRequest,
};
use notary_types::{AccountId, LedgerEntryId, RegistrationId};
use notary_verify::{Subject, VerificationResult, VerifyInput};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::{require, Action, Identity};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Build info plus what a client needs to verify and poll on its own.
pub async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config();
    Json(json!({
        "name": "notary-server",
        "version": env!("CARGO_PKG_VERSION"),
        "network": state.calendar().name(),
        "calendarKey": state.calendar().verifying_key().to_hex(),
        "pollIntervalSecs": config.client.poll_interval_secs,
        "maxWaitSecs": config.client.max_wait_secs,
        "anchoringTimeoutSecs": config.pipeline.anchoring_timeout_secs,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub id: String,
}

pub async fn registration_status_handler(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<RegistrationStatusResponse>, ApiError> {
    let id = parse_registration_id(&query.id)?;
    Ok(Json(state.pipeline().status(&id)?))
}

/// Pay for a registration and start anchoring it.
pub async fn submit_registration_handler(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<SubmitRegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationStatusResponse>), ApiError> {
    require(&state, &identity, Action::Register).await?;
    let mut request = SubmitRequest::new(body.fingerprint);
    request.registration_id = body.registration_id;

    let registration = state.pipeline().submit(&identity.account, request).await?;
    start_anchoring(&state, &registration.id).await;
    Ok((StatusCode::ACCEPTED, Json(state.pipeline().status(&registration.id)?)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub registration_id: Option<RegistrationId>,
}

pub async fn retry_registration_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    body: Option<Json<RetryRequest>>,
) -> Result<(StatusCode, Json<RegistrationStatusResponse>), ApiError> {
    require(&state, &identity, Action::Register).await?;
    let failed_id = parse_registration_id(&id)?;
    let new_id = body.and_then(|Json(b)| b.registration_id);

    let registration = state
        .pipeline()
        .retry(&identity.account, &failed_id, new_id)
        .await?;
    start_anchoring(&state, &registration.id).await;
    Ok((StatusCode::ACCEPTED, Json(state.pipeline().status(&registration.id)?)))
}

pub async fn certificate_handler(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<Certificate>, ApiError> {
    require(&state, &identity, Action::ReadCertificate).await?;
    let id = parse_registration_id(&id)?;
    let certificate = state.pipeline().certificate(&id)?;
    if certificate.owner_id != identity.account && !identity.is_admin {
        return Err(ApiError::NotFound(format!("registration {id} not found")));
    }
    Ok(Json(certificate))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub fingerprint: String,
}

pub async fn verify_fingerprint_handler(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<VerificationResult>, ApiError> {
    let input = VerifyInput::Fingerprint(query.fingerprint);
    Ok(Json(state.verifier().verify(&input)?))
}

/// Multipart verification: `proofFile` with either `content` or
/// `fingerprint`. Without a proof file it falls back to the registry.
pub async fn verify_upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<VerificationResult>, ApiError> {
    let mut proof_file = None;
    let mut content = None;
    let mut fingerprint = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("field {name}: {e}")))?;
        match name.as_str() {
            "proofFile" => proof_file = Some(bytes.to_vec()),
            "content" => content = Some(bytes.to_vec()),
            "fingerprint" => fingerprint = Some(String::from_utf8_lossy(&bytes).trim().to_string()),
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let input = match (proof_file, content, fingerprint) {
        (Some(artifact), Some(content), _) => VerifyInput::ProofFile {
            subject: Subject::Content(content),
            artifact,
        },
        (Some(artifact), None, Some(fp)) => VerifyInput::ProofFile {
            subject: Subject::Fingerprint(fp),
            artifact,
        },
        (None, _, Some(fp)) => VerifyInput::Fingerprint(fp),
        _ => {
            return Err(ApiError::BadRequest(
                "expected proofFile with content or fingerprint, or a fingerprint".into(),
            ))
        }
    };
    Ok(Json(state.verifier().verify(&input)?))
}

pub async fn balance_handler(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<BalanceResponse>, ApiError> {
    require(&state, &identity, Action::ReadBalance).await?;
    let row = state.accounting().balance(&identity.account)?;
    Ok(Json(row.to_response()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileQuery {
    pub account_id: Option<AccountId>,
}

pub async fn reconcile_handler(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let account = query.account_id.unwrap_or_else(|| identity.account.clone());
    require(&state, &identity, Action::Reconcile { account: account.clone() }).await?;
    let report = state.accounting().reconcile(&account)?;
    Ok(Json(report.to_response()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantCreditsResponse {
    pub entry_id: LedgerEntryId,
    pub idempotent: bool,
    pub balance: BalanceResponse,
}

/// Payment capture webhook.
pub async fn grant_handler(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<GrantCreditsRequest>,
) -> Result<Json<GrantCreditsResponse>, ApiError> {
    require(&state, &identity, Action::Grant).await?;
    let reason = body.reason.as_deref().unwrap_or("credit purchase");
    let outcome = state
        .accounting()
        .grant(&body.account_id, body.amount, &body.payment_reference, reason)?;
    let (entry_id, idempotent) = match outcome {
        GrantOutcome::Applied { entry_id, .. } => (entry_id, false),
        GrantOutcome::AlreadyApplied { entry_id } => (entry_id, true),
    };
    let balance = state.accounting().balance(&body.account_id)?.to_response();
    Ok(Json(GrantCreditsResponse {
        entry_id,
        idempotent,
        balance,
    }))
}

fn parse_registration_id(raw: &str) -> Result<RegistrationId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid registration id: {raw}")))
}

/// Kick off anchoring right away; the sweeper picks up anything left behind.
async fn start_anchoring(state: &AppState, id: &RegistrationId) {
    if let Err(e) = state.pipeline().start(id).await {
        warn!(registration = %id, error = %e, "could not start anchoring; sweeper will retry");
    }
}
