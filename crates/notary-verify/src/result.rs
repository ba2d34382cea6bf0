use chrono::{DateTime, Utc};
use notary_anchor::{AnchoringProof, Registration};
use notary_crypto::Attestation;
use notary_types::{RegistrationId, RegistrationStatus};
use serde::{Deserialize, Serialize};

/// Verification verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// A valid anchoring proof exists for the fingerprint.
    Verified,
    /// A registration exists but is not confirmed yet.
    Processing,
    /// Nothing anchors this fingerprint.
    NotFound,
    /// The input failed syntactic validation; nothing was looked up.
    InvalidFormat,
}

/// Registration details included in a verification result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSummary {
    pub id: RegistrationId,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl From<&Registration> for RegistrationSummary {
    fn from(r: &Registration) -> Self {
        Self {
            id: r.id,
            status: r.status,
            registered_at: r.created_at,
            confirmed_at: r.confirmed_at,
        }
    }
}

/// Proof details included in a verification result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<uuid::Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_reference: Option<String>,
    pub network: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_key: Option<String>,
}

impl ProofSummary {
    pub fn from_attestation(network: &str, method: &str, attestation: &Attestation) -> Self {
        Self {
            id: None,
            proof_reference: None,
            network: network.to_string(),
            method: method.to_string(),
            block_reference: Some(attestation.block_reference.clone()),
            block_height: Some(attestation.block_height),
            confirmed_at: Some(attestation.attested_at),
            calendar_key: Some(attestation.calendar_key.to_hex()),
        }
    }
}

impl From<&AnchoringProof> for ProofSummary {
    fn from(p: &AnchoringProof) -> Self {
        let attestation = p.artifact.attestation.as_ref();
        Self {
            id: Some(p.id),
            proof_reference: Some(p.proof_reference.clone()),
            network: p.network.clone(),
            method: p.method.clone(),
            block_reference: p.block_reference.clone(),
            block_height: attestation.map(|a| a.block_height),
            confirmed_at: p.confirmed_at,
            calendar_key: attestation.map(|a| a.calendar_key.to_hex()),
        }
    }
}

/// Wire shape of `/verify` responses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: VerificationStatus,
    /// Normalized fingerprint, or the raw input when it failed the format gate.
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<RegistrationSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofSummary>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_notice: Option<String>,
}

impl VerificationResult {
    pub(crate) fn new(status: VerificationStatus, fingerprint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            fingerprint: fingerprint.into(),
            registration: None,
            proof: None,
            message: message.into(),
            legal_notice: None,
        }
    }

    pub(crate) fn with_registration(mut self, registration: &Registration) -> Self {
        self.registration = Some(registration.into());
        self
    }

    pub(crate) fn with_proof(mut self, proof: ProofSummary) -> Self {
        self.proof = Some(proof);
        self
    }

    pub fn is_verified(&self) -> bool {
        self.status == VerificationStatus::Verified
    }
}
