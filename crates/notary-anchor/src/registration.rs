use chrono::{DateTime, Utc};
use notary_crypto::ProofArtifact;
use notary_types::api::{ProofView, RegistrationStatusResponse};
use notary_types::{AccountId, Fingerprint, RegistrationId, RegistrationStatus};
use serde::{Deserialize, Serialize};

/// One user submission, driven through the anchoring state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: RegistrationId,
    pub owner_id: AccountId,
    pub fingerprint: Fingerprint,
    pub status: RegistrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Start of the anchoring attempt; the pipeline deadline runs from here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Network handle for the in-flight submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_reference: Option<String>,
    /// The FAILED registration this one retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<RegistrationId>,
}

impl Registration {
    pub fn new(
        id: RegistrationId,
        owner_id: AccountId,
        fingerprint: Fingerprint,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            fingerprint,
            status: RegistrationStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
            processing_started_at: None,
            confirmed_at: None,
            proof_reference: None,
            retry_of: None,
        }
    }

    pub fn with_retry_of(mut self, failed: RegistrationId) -> Self {
        self.retry_of = Some(failed);
        self
    }

    pub fn is_owned_by(&self, principal: &AccountId) -> bool {
        self.owner_id == *principal
    }

    /// Wire shape of `GET /registration-status`.
    pub fn to_status_response(&self, proof: Option<&AnchoringProof>) -> RegistrationStatusResponse {
        RegistrationStatusResponse {
            registration_id: self.id,
            status: self.status,
            fingerprint: self.fingerprint,
            error_message: self.error_message.clone(),
            confirmed_at: self.confirmed_at,
            proof: proof.map(AnchoringProof::to_view),
        }
    }
}

/// Evidence recorded when a registration is confirmed. Immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoringProof {
    pub id: uuid::Uuid,
    pub registration_id: RegistrationId,
    pub proof_reference: String,
    pub network: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_count: Option<u32>,
    /// Portable artifact handed to the owner for independent verification.
    pub artifact: ProofArtifact,
}

impl AnchoringProof {
    pub fn to_view(&self) -> ProofView {
        ProofView {
            id: self.id,
            proof_reference: self.proof_reference.clone(),
            network: self.network.clone(),
            method: self.method.clone(),
            confirmed_at: self.confirmed_at,
        }
    }
}
