//! Portable proof artifact.
//!
//! A `ProofArtifact` is the document handed to the content owner after a
//! fingerprint is anchored. It is self-contained: the Merkle path leads from
//! the fingerprint to a root, and the attestation binds that root to a block
//! of the anchoring network under the calendar's public key. Anyone holding
//! the original content and this file can re-run every check.

use chrono::{DateTime, Utc};
use notary_types::Fingerprint;
use serde::{Deserialize, Serialize};

use crate::hasher::NodeHash;
use crate::merkle::MerkleProof;
use crate::signer::{Signature, VerifyingKey};

/// Current artifact format version.
pub const ARTIFACT_VERSION: u32 = 1;

const ATTESTATION_TAG: &str = "notary-attestation-v1";

/// Calendar statement that a Merkle root was included in a network block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub root: NodeHash,
    pub block_reference: String,
    pub block_height: u64,
    pub attested_at: DateTime<Utc>,
    pub calendar_key: VerifyingKey,
    pub signature: Signature,
}

impl Attestation {
    /// Canonical bytes covered by the calendar signature.
    pub fn signing_message(
        network: &str,
        root: &NodeHash,
        block_reference: &str,
        block_height: u64,
        attested_at: DateTime<Utc>,
    ) -> Vec<u8> {
        format!(
            "{ATTESTATION_TAG}\n{network}\n{root}\n{block_reference}\n{block_height}\n{}",
            attested_at.timestamp_millis()
        )
        .into_bytes()
    }
}

/// Self-contained evidence that a fingerprint was anchored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofArtifact {
    pub version: u32,
    pub fingerprint: Fingerprint,
    pub network: String,
    pub method: String,
    pub merkle: MerkleProof,
    /// Absent while the calendar has not yet attested the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Attestation>,
}

/// Outcome of a successful artifact check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactState<'a> {
    /// Root attested and signature valid.
    Anchored(&'a Attestation),
    /// Structurally valid, awaiting attestation.
    Pending,
}

/// Reasons an artifact does not establish an anchoring.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("malformed proof artifact: {0}")]
    Malformed(String),

    #[error("unsupported proof artifact version {0}")]
    UnsupportedVersion(u32),

    #[error("merkle leaf does not match the artifact fingerprint")]
    LeafMismatch,

    #[error("merkle path does not lead to the stated root")]
    MerklePathInvalid,

    #[error("attested root differs from the merkle root")]
    RootMismatch,

    #[error("proof anchors fingerprint {anchored}, not {expected}")]
    FingerprintMismatch {
        expected: Fingerprint,
        anchored: Fingerprint,
    },

    #[error("calendar key {0} is not trusted")]
    UntrustedCalendar(String),

    #[error("calendar signature does not verify")]
    BadSignature,
}

impl ArtifactError {
    /// `true` for errors in the artifact's own structure, as opposed to
    /// errors about what it proves.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_)
                | Self::UnsupportedVersion(_)
                | Self::LeafMismatch
                | Self::MerklePathInvalid
                | Self::RootMismatch
        )
    }
}

impl ProofArtifact {
    /// Parse an artifact from its JSON encoding.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ArtifactError> {
        serde_json::from_slice(bytes).map_err(|e| ArtifactError::Malformed(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, ArtifactError> {
        serde_json::to_string_pretty(self).map_err(|e| ArtifactError::Malformed(e.to_string()))
    }

    /// Check internal consistency: version, leaf, Merkle path, and that any
    /// attestation refers to the same root.
    pub fn check_structure(&self) -> Result<(), ArtifactError> {
        if self.version != ARTIFACT_VERSION {
            return Err(ArtifactError::UnsupportedVersion(self.version));
        }
        if self.merkle.leaf != self.fingerprint {
            return Err(ArtifactError::LeafMismatch);
        }
        if !self.merkle.verify() {
            return Err(ArtifactError::MerklePathInvalid);
        }
        if let Some(attestation) = &self.attestation {
            if attestation.root != self.merkle.root {
                return Err(ArtifactError::RootMismatch);
            }
        }
        Ok(())
    }

    /// Full check against an expected fingerprint.
    ///
    /// Only attestations signed by one of `trusted_keys` are accepted. The
    /// key embedded in the artifact is never trusted on its own, so an empty
    /// slice accepts no attestation.
    pub fn check(
        &self,
        expected: &Fingerprint,
        trusted_keys: &[VerifyingKey],
    ) -> Result<ArtifactState<'_>, ArtifactError> {
        self.check_structure()?;

        if self.fingerprint != *expected {
            return Err(ArtifactError::FingerprintMismatch {
                expected: *expected,
                anchored: self.fingerprint,
            });
        }

        let Some(attestation) = &self.attestation else {
            return Ok(ArtifactState::Pending);
        };

        if !trusted_keys.contains(&attestation.calendar_key) {
            return Err(ArtifactError::UntrustedCalendar(
                attestation.calendar_key.to_hex(),
            ));
        }

        let message = Attestation::signing_message(
            &self.network,
            &attestation.root,
            &attestation.block_reference,
            attestation.block_height,
            attestation.attested_at,
        );
        attestation
            .calendar_key
            .verify(&message, &attestation.signature)
            .map_err(|_| ArtifactError::BadSignature)?;

        Ok(ArtifactState::Anchored(attestation))
    }
}
