//! Wire DTOs shared by the HTTP server and its clients.
//!
//! Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::ids::{AccountId, RegistrationId};
use crate::status::RegistrationStatus;

/// Response of `GET /registration-status?id=<registrationId>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatusResponse {
    pub registration_id: RegistrationId,
    pub status: RegistrationStatus,
    pub fingerprint: Fingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofView>,
}

/// Public view of an anchoring proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofView {
    pub id: uuid::Uuid,
    pub proof_reference: String,
    pub network: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Body of `POST /registrations`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRegistrationRequest {
    pub fingerprint: Fingerprint,
    /// Client-chosen id; resubmitting the same id is idempotent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<RegistrationId>,
}

/// Result shape of the `consumeCredit` contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeCreditResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_balance: Option<u64>,
}

/// Result shape of the `reconcileBalance` contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub was_consistent: bool,
    pub corrected: bool,
}

/// Response of `GET /credits/balance`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub total_credits: u64,
    pub available_credits: u64,
    pub used_credits: u64,
    pub version: u64,
}

/// Body of `POST /credits/grant`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantCreditsRequest {
    pub account_id: AccountId,
    pub amount: u64,
    /// External payment reference; granting the same reference twice is a no-op.
    pub payment_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Response of `GET /v1/health`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_response_omits_absent_fields() {
        let response = RegistrationStatusResponse {
            registration_id: RegistrationId::new(),
            status: RegistrationStatus::Processing,
            fingerprint: Fingerprint::from_digest([7; 32]),
            error_message: None,
            confirmed_at: None,
            proof: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "PROCESSING");
        assert!(value.get("registrationId").is_some());
        assert!(value.get("errorMessage").is_none());
        assert!(value.get("proof").is_none());
    }

    #[test]
    fn consume_response_matches_contract_shape() {
        let idempotent = ConsumeCreditResponse {
            success: false,
            idempotent: Some(true),
            remaining_balance: None,
        };
        assert_eq!(
            serde_json::to_value(&idempotent).unwrap(),
            json!({ "success": false, "idempotent": true })
        );
    }

    #[test]
    fn submit_request_accepts_missing_id() {
        let body = json!({ "fingerprint": "ab".repeat(32) });
        let request: SubmitRegistrationRequest = serde_json::from_value(body).unwrap();
        assert!(request.registration_id.is_none());
    }
}
