use std::sync::Arc;

use notary_crypto::{fingerprint_bytes, ArtifactState, ProofArtifact, VerifyingKey};
use notary_types::{Fingerprint, RegistrationStatus};
use tracing::debug;

use crate::error::VerifyError;
use crate::lookup::RegistryLookup;
use crate::result::{ProofSummary, VerificationResult, VerificationStatus};

pub const DEFAULT_LEGAL_NOTICE: &str = "This result shows that the fingerprint above was anchored \
in a tamper-evident timestamping ledger at the stated time. It does not by itself establish \
authorship or ownership of the content.";

/// Verifier policy.
#[derive(Clone, Debug)]
pub struct VerifierConfig {
    /// Calendar keys accepted on attestations. With none configured no
    /// attestation verifies.
    pub trusted_calendar_keys: Vec<VerifyingKey>,
    /// Attached to `VERIFIED` results.
    pub legal_notice: Option<String>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            trusted_calendar_keys: Vec::new(),
            legal_notice: Some(DEFAULT_LEGAL_NOTICE.to_string()),
        }
    }
}

/// What the proof artifact is checked against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subject {
    /// Original content; the fingerprint is recomputed locally.
    Content(Vec<u8>),
    /// A fingerprint the caller computed, still subject to the format gate.
    Fingerprint(String),
}

/// Verification request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyInput {
    Fingerprint(String),
    ProofFile { subject: Subject, artifact: Vec<u8> },
}

/// Proof verifier.
pub struct ProofVerifier {
    registry: Option<Arc<dyn RegistryLookup>>,
    config: VerifierConfig,
}

impl ProofVerifier {
    /// Verifier backed by a registry, answering both modes.
    pub fn new(registry: Arc<dyn RegistryLookup>, config: VerifierConfig) -> Self {
        Self {
            registry: Some(registry),
            config,
        }
    }

    /// Verifier without a registry; fingerprint-only requests resolve to
    /// `NOT_FOUND`.
    pub fn offline(config: VerifierConfig) -> Self {
        Self {
            registry: None,
            config,
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn verify(&self, input: &VerifyInput) -> Result<VerificationResult, VerifyError> {
        match input {
            VerifyInput::Fingerprint(raw) => self.verify_fingerprint(raw),
            VerifyInput::ProofFile { subject, artifact } => Ok(self.verify_artifact(subject, artifact)),
        }
    }

    /// Fingerprint-only mode.
    pub fn verify_fingerprint(&self, raw: &str) -> Result<VerificationResult, VerifyError> {
        let Ok(fingerprint) = Fingerprint::parse(raw) else {
            return Ok(invalid_fingerprint(raw));
        };
        let hex = fingerprint.to_hex();

        let Some(registry) = &self.registry else {
            return Ok(VerificationResult::new(
                VerificationStatus::NotFound,
                hex,
                "no registry available; supply a proof file to verify offline",
            ));
        };

        let mut registrations = registry.registrations_for(&fingerprint)?;
        // Most recent first.
        registrations.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut rejected_proof = None;
        for registration in registrations
            .iter()
            .filter(|r| r.status == RegistrationStatus::Confirmed)
        {
            let Some(proof) = registry.proof_for(&registration.id)? else {
                rejected_proof = Some("confirmed registration has no stored proof".to_string());
                continue;
            };
            match proof.artifact.check(&fingerprint, &self.config.trusted_calendar_keys) {
                Ok(ArtifactState::Anchored(_)) => {
                    return Ok(self.verified(
                        VerificationResult::new(
                            VerificationStatus::Verified,
                            hex,
                            "fingerprint anchored; proof verified",
                        )
                        .with_registration(registration)
                        .with_proof((&proof).into()),
                    ));
                }
                Ok(ArtifactState::Pending) => {
                    rejected_proof = Some("stored proof is not yet attested".to_string());
                }
                Err(e) => {
                    debug!(registration = %registration.id, error = %e, "stored proof failed re-validation");
                    rejected_proof = Some(format!("stored proof failed validation: {e}"));
                }
            }
        }

        if let Some(in_progress) = registrations
            .iter()
            .find(|r| !r.status.is_terminal())
        {
            return Ok(VerificationResult::new(
                VerificationStatus::Processing,
                hex,
                "registration found; anchoring has not completed yet",
            )
            .with_registration(in_progress));
        }

        let message = match (rejected_proof, registrations.first()) {
            (Some(reason), _) => reason,
            (None, Some(_)) => "no confirmed registration; the last anchoring attempt failed".to_string(),
            (None, None) => "no registration matches this fingerprint".to_string(),
        };
        Ok(VerificationResult::new(VerificationStatus::NotFound, hex, message))
    }

    /// Proof-file mode. Uses only the content and the artifact.
    pub fn verify_artifact(&self, subject: &Subject, artifact_json: &[u8]) -> VerificationResult {
        let fingerprint = match subject {
            Subject::Content(bytes) => fingerprint_bytes(bytes),
            Subject::Fingerprint(raw) => match Fingerprint::parse(raw) {
                Ok(fp) => fp,
                Err(_) => return invalid_fingerprint(raw),
            },
        };
        let hex = fingerprint.to_hex();

        let artifact = match ProofArtifact::from_json(artifact_json) {
            Ok(artifact) => artifact,
            Err(e) => {
                return VerificationResult::new(VerificationStatus::InvalidFormat, hex, e.to_string())
            }
        };

        match artifact.check(&fingerprint, &self.config.trusted_calendar_keys) {
            Ok(ArtifactState::Anchored(attestation)) => self.verified(
                VerificationResult::new(
                    VerificationStatus::Verified,
                    hex,
                    "proof artifact anchors this content",
                )
                .with_proof(ProofSummary::from_attestation(
                    &artifact.network,
                    &artifact.method,
                    attestation,
                )),
            ),
            Ok(ArtifactState::Pending) => VerificationResult::new(
                VerificationStatus::Processing,
                hex,
                "proof artifact is well-formed but not yet attested",
            ),
            Err(e) if e.is_structural() => {
                VerificationResult::new(VerificationStatus::InvalidFormat, hex, e.to_string())
            }
            Err(e) => VerificationResult::new(VerificationStatus::NotFound, hex, e.to_string()),
        }
    }

    fn verified(&self, result: VerificationResult) -> VerificationResult {
        VerificationResult {
            legal_notice: self.config.legal_notice.clone(),
            ..result
        }
    }
}

fn invalid_fingerprint(raw: &str) -> VerificationResult {
    VerificationResult::new(
        VerificationStatus::InvalidFormat,
        raw,
        "fingerprint must be exactly 64 hexadecimal characters",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use notary_anchor::{
        AnchorNetwork, AnchoringPipeline, AnchoringProof, InMemoryRegistrationStore, LocalCalendar,
        PipelineConfig, Registration, RegistrationStore, SubmitRequest,
    };
    use notary_crypto::SigningKey;
    use notary_ledger::{CreditAccounting, InMemoryBalanceCache, InMemoryCreditLedger};
    use notary_types::{AccountId, RegistrationId};
    use proptest::prelude::*;

    struct CountingRegistry {
        lookups: AtomicUsize,
    }

    impl RegistryLookup for CountingRegistry {
        fn registrations_for(&self, _: &Fingerprint) -> Result<Vec<Registration>, VerifyError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }

        fn proof_for(&self, _: &RegistrationId) -> Result<Option<AnchoringProof>, VerifyError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    fn counting() -> (Arc<CountingRegistry>, ProofVerifier) {
        let registry = Arc::new(CountingRegistry {
            lookups: AtomicUsize::new(0),
        });
        let verifier = ProofVerifier::new(registry.clone(), VerifierConfig::default());
        (registry, verifier)
    }

    struct World {
        pipeline: AnchoringPipeline,
        store: Arc<InMemoryRegistrationStore>,
        calendar: Arc<LocalCalendar>,
        alice: AccountId,
    }

    fn world() -> World {
        let store = Arc::new(InMemoryRegistrationStore::new());
        let credits = Arc::new(CreditAccounting::new(
            Arc::new(InMemoryCreditLedger::new()),
            Arc::new(InMemoryBalanceCache::new()),
        ));
        let alice = AccountId::new("alice").unwrap();
        credits.grant(&alice, 10, "pay-1", "purchase").unwrap();
        let calendar = Arc::new(LocalCalendar::new("test-calendar", SigningKey::from_bytes([1; 32])));
        let pipeline = AnchoringPipeline::new(
            store.clone(),
            credits,
            calendar.clone() as Arc<dyn AnchorNetwork>,
            PipelineConfig::default(),
        );
        World {
            pipeline,
            store,
            calendar,
            alice,
        }
    }

    fn trusting(world: &World) -> VerifierConfig {
        VerifierConfig {
            trusted_calendar_keys: vec![world.calendar.verifying_key()],
            ..VerifierConfig::default()
        }
    }

    async fn confirmed(world: &World, content: &[u8]) -> Registration {
        let reg = world
            .pipeline
            .submit(&world.alice, SubmitRequest::new(fingerprint_bytes(content)))
            .await
            .unwrap();
        world.pipeline.start(&reg.id).await.unwrap();
        world.calendar.seal().unwrap();
        world.pipeline.refresh(&reg.id).await.unwrap()
    }

    #[test]
    fn short_fingerprint_is_invalid_without_lookup() {
        let (registry, verifier) = counting();
        let result = verifier.verify(&VerifyInput::Fingerprint("a".repeat(63))).unwrap();
        assert_eq!(result.status, VerificationStatus::InvalidFormat);
        assert_eq!(result.fingerprint, "a".repeat(63));
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn non_hex_fingerprint_is_invalid_without_lookup() {
        let (registry, verifier) = counting();
        let result = verifier.verify_fingerprint(&"g".repeat(64)).unwrap();
        assert_eq!(result.status, VerificationStatus::InvalidFormat);
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_fingerprint_is_not_found() {
        let (registry, verifier) = counting();
        let result = verifier.verify_fingerprint(&"ab".repeat(32)).unwrap();
        assert_eq!(result.status, VerificationStatus::NotFound);
        assert_eq!(registry.lookups.load(Ordering::SeqCst), 1);
        assert!(result.legal_notice.is_none());
    }

    #[tokio::test]
    async fn confirmed_registration_is_verified() {
        let w = world();
        let reg = confirmed(&w, b"manuscript").await;
        let verifier = ProofVerifier::new(w.store.clone(), trusting(&w));

        let result = verifier
            .verify_fingerprint(&reg.fingerprint.to_hex().to_uppercase())
            .unwrap();
        assert!(result.is_verified());
        assert_eq!(result.fingerprint, reg.fingerprint.to_hex());
        assert_eq!(result.registration.unwrap().id, reg.id);
        let proof = result.proof.unwrap();
        assert_eq!(
            proof.id,
            Some(w.store.proof(&reg.id).unwrap().unwrap().id)
        );
        assert!(result.legal_notice.is_some());
    }

    #[tokio::test]
    async fn unconfirmed_registration_is_processing() {
        let w = world();
        let reg = w
            .pipeline
            .submit(&w.alice, SubmitRequest::new(fingerprint_bytes(b"draft")))
            .await
            .unwrap();
        let verifier = ProofVerifier::new(w.store.clone(), VerifierConfig::default());
        let result = verifier.verify_fingerprint(&reg.fingerprint.to_hex()).unwrap();
        assert_eq!(result.status, VerificationStatus::Processing);
        assert!(result.proof.is_none());
    }

    #[tokio::test]
    async fn stored_proof_from_untrusted_calendar_is_not_verified() {
        let w = world();
        let reg = confirmed(&w, b"essay").await;
        let config = VerifierConfig {
            trusted_calendar_keys: vec![SigningKey::from_bytes([2; 32]).verifying_key()],
            ..VerifierConfig::default()
        };
        let verifier = ProofVerifier::new(w.store.clone(), config);
        let result = verifier.verify_fingerprint(&reg.fingerprint.to_hex()).unwrap();
        assert_eq!(result.status, VerificationStatus::NotFound);
        assert!(result.message.contains("not trusted"));
    }

    #[tokio::test]
    async fn artifact_verifies_offline_from_content() {
        let w = world();
        let reg = confirmed(&w, b"song lyrics").await;
        let artifact = w
            .store
            .proof(&reg.id)
            .unwrap()
            .unwrap()
            .artifact
            .to_json_pretty()
            .unwrap();

        // A verifier with no registry at all: only content and artifact.
        let verifier = ProofVerifier::offline(VerifierConfig {
            trusted_calendar_keys: vec![w.calendar.verifying_key()],
            legal_notice: None,
        });
        let result = verifier.verify(&VerifyInput::ProofFile {
            subject: Subject::Content(b"song lyrics".to_vec()),
            artifact: artifact.clone().into_bytes(),
        });
        let result = result.unwrap();
        assert!(result.is_verified(), "{}", result.message);
        assert_eq!(result.proof.unwrap().block_height, Some(1));

        let tampered = verifier.verify_artifact(&Subject::Content(b"song lyrics!".to_vec()), artifact.as_bytes());
        assert_eq!(tampered.status, VerificationStatus::NotFound);
    }

    #[tokio::test]
    async fn self_signed_artifact_is_not_verified_offline() {
        let w = world();
        let reg = confirmed(&w, b"stolen poem").await;
        let artifact = w.store.proof(&reg.id).unwrap().unwrap().artifact;
        let json = artifact.to_json_pretty().unwrap();

        let verifier = ProofVerifier::offline(VerifierConfig::default());
        let result = verifier.verify_artifact(&Subject::Content(b"stolen poem".to_vec()), json.as_bytes());
        assert_eq!(result.status, VerificationStatus::NotFound);
        assert!(result.message.contains(&w.calendar.verifying_key().to_hex()));
        assert!(result.legal_notice.is_none());
    }

    #[test]
    fn malformed_artifact_is_invalid_format() {
        let verifier = ProofVerifier::offline(VerifierConfig::default());
        let result = verifier.verify_artifact(&Subject::Content(b"x".to_vec()), b"{\"version\": 1}");
        assert_eq!(result.status, VerificationStatus::InvalidFormat);
    }

    #[test]
    fn pending_artifact_is_processing() {
        let fp = fingerprint_bytes(b"x");
        let tree = notary_crypto::MerkleTree::from_leaves(vec![fp]).unwrap();
        let artifact = ProofArtifact {
            version: notary_crypto::ARTIFACT_VERSION,
            fingerprint: fp,
            network: "n".into(),
            method: "m".into(),
            merkle: tree.proof(0).unwrap(),
            attestation: None,
        };
        let json = artifact.to_json_pretty().unwrap();
        let verifier = ProofVerifier::offline(VerifierConfig::default());
        let result = verifier.verify_artifact(&Subject::Fingerprint(fp.to_hex()), json.as_bytes());
        assert_eq!(result.status, VerificationStatus::Processing);
    }

    #[test]
    fn result_serializes_in_wire_shape() {
        let (_, verifier) = counting();
        let result = verifier.verify_fingerprint("xyz").unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "INVALID_FORMAT");
        assert_eq!(json["fingerprint"], "xyz");
        assert!(json.get("legalNotice").is_none());
    }

    proptest! {
        #[test]
        fn wrong_length_never_reaches_registry(len in 0usize..130) {
            prop_assume!(len != 64);
            let (registry, verifier) = counting();
            let result = verifier.verify_fingerprint(&"a".repeat(len)).unwrap();
            prop_assert_eq!(result.status, VerificationStatus::InvalidFormat);
            prop_assert_eq!(registry.lookups.load(Ordering::SeqCst), 0);
        }
    }
}
