use chrono::{DateTime, Utc};
use notary_crypto::ProofArtifact;
use notary_types::api::ProofView;
use notary_types::{AccountId, Fingerprint, RegistrationId, RegistrationStatus};
use serde::{Deserialize, Serialize};

use crate::error::{AnchorError, AnchorResult};
use crate::registration::{AnchoringProof, Registration};

/// Certificate data for a confirmed registration.
///
/// Rendering (PDF, page layout) happens elsewhere; this carries everything
/// a renderer or a third-party verifier needs, including the portable
/// proof artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub registration_id: RegistrationId,
    pub owner_id: AccountId,
    pub fingerprint: Fingerprint,
    pub registered_at: DateTime<Utc>,
    pub confirmed_at: DateTime<Utc>,
    pub proof: ProofView,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reference: Option<String>,
    pub artifact: ProofArtifact,
}

impl Certificate {
    pub fn issue(registration: &Registration, proof: Option<&AnchoringProof>) -> AnchorResult<Self> {
        if registration.status != RegistrationStatus::Confirmed {
            return Err(AnchorError::NotConfirmed {
                id: registration.id,
                status: registration.status,
            });
        }
        let proof = proof.ok_or(AnchorError::MissingProof(registration.id))?;
        Ok(Self {
            registration_id: registration.id,
            owner_id: registration.owner_id.clone(),
            fingerprint: registration.fingerprint,
            registered_at: registration.created_at,
            confirmed_at: registration
                .confirmed_at
                .or(proof.confirmed_at)
                .unwrap_or(registration.updated_at),
            proof: proof.to_view(),
            block_reference: proof.block_reference.clone(),
            artifact: proof.artifact.clone(),
        })
    }
}
