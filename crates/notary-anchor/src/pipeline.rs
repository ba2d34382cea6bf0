//! Anchoring pipeline.
//!
//! Drives registrations through the state machine. `start` and `refresh`
//! share a per-registration single-flight guard, so at most one anchoring
//! attempt is in flight for a given id within this process. Across
//! processes the store's status compare-and-set decides: only the caller
//! whose `PENDING → PROCESSING` transition was applied submits to the
//! network.
//!
//! A refund that fails after a registration is marked FAILED is queued and
//! retried by every `sweep` until the ledger accepts it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notary_ledger::{ConsumeOutcome, CreditConsumer};
use notary_types::api::RegistrationStatusResponse;
use notary_types::{AccountId, Clock, Fingerprint, RegistrationId, RegistrationStatus, SystemClock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::certificate::Certificate;
use crate::error::{AnchorError, AnchorResult};
use crate::events::{RegistrationEvent, RegistrationEvents};
use crate::network::{AnchorNetwork, Confirmation, NetworkStatus};
use crate::registration::{AnchoringProof, Registration};
use crate::store::{RegistrationStore, StatusChange, TransitionOutcome};

/// Default server-side anchoring deadline.
pub const DEFAULT_ANCHORING_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Prefix of the error message recorded on a deadline failure.
pub const TIMEOUT_MESSAGE_PREFIX: &str = "anchoring timed out";

/// Pipeline policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Time a registration may stay PROCESSING before it is failed.
    pub anchoring_timeout: Duration,
    /// Refund the consumed credit when a registration fails.
    pub refund_on_failure: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            anchoring_timeout: DEFAULT_ANCHORING_TIMEOUT,
            refund_on_failure: true,
        }
    }
}

/// A new registration request from an authenticated principal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitRequest {
    pub fingerprint: Fingerprint,
    /// Client-chosen id. Resubmitting the same id never charges twice.
    pub registration_id: Option<RegistrationId>,
    pub retry_of: Option<RegistrationId>,
}

impl SubmitRequest {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            registration_id: None,
            retry_of: None,
        }
    }

    pub fn with_id(mut self, id: RegistrationId) -> Self {
        self.registration_id = Some(id);
        self
    }
}

/// Counts from one `sweep` pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub started: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub still_processing: usize,
    pub refunds_retried: usize,
    pub errors: usize,
}

/// Registration state machine driver.
pub struct AnchoringPipeline {
    store: Arc<dyn RegistrationStore>,
    credits: Arc<dyn CreditConsumer>,
    network: Arc<dyn AnchorNetwork>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    in_flight: Mutex<HashSet<RegistrationId>>,
    refunds_due: Mutex<HashSet<RegistrationId>>,
    events: RegistrationEvents,
}

/// Holds a registration id in the in-flight set until dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<RegistrationId>>,
    id: RegistrationId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.id);
    }
}

impl AnchoringPipeline {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        credits: Arc<dyn CreditConsumer>,
        network: Arc<dyn AnchorNetwork>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            credits,
            network,
            clock: Arc::new(SystemClock),
            config,
            in_flight: Mutex::new(HashSet::new()),
            refunds_due: Mutex::new(HashSet::new()),
            events: RegistrationEvents::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RegistrationStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.events.subscribe()
    }

    /// Pay for and create a registration in PENDING.
    ///
    /// The credit is consumed before the record is written, keyed by the
    /// registration id. A repeated request with the same id returns the
    /// existing registration; if an earlier attempt consumed but never
    /// created the record, it is created now without charging again.
    pub async fn submit(&self, principal: &AccountId, request: SubmitRequest) -> AnchorResult<Registration> {
        let id = request.registration_id.unwrap_or_default();

        if let Some(existing) = self.store.get(&id)? {
            Self::ensure_owner(&existing, principal)?;
            if existing.fingerprint != request.fingerprint {
                return Err(AnchorError::FingerprintConflict(id));
            }
            debug!(registration = %id, "duplicate submission; returning existing registration");
            return Ok(existing);
        }

        let reason = format!("registration of {}", request.fingerprint.short_hex());
        let outcome = self
            .credits
            .consume_credit(principal, &id.to_string(), &reason)?;
        if let ConsumeOutcome::AlreadyApplied { .. } = outcome {
            info!(registration = %id, account = %principal, "credit already consumed; completing registration");
        }

        let mut registration =
            Registration::new(id, principal.clone(), request.fingerprint, self.clock.now());
        if let Some(failed) = request.retry_of {
            registration = registration.with_retry_of(failed);
        }

        let (stored, created) = self.store.insert(registration)?;
        if created {
            info!(registration = %id, account = %principal, fingerprint = %stored.fingerprint.short_hex(), "registration created");
            self.events.publish(RegistrationEvent {
                registration_id: id,
                owner_id: stored.owner_id.clone(),
                from: None,
                to: stored.status,
                at: stored.created_at,
            });
        } else if stored.fingerprint != request.fingerprint || !stored.is_owned_by(principal) {
            return Err(AnchorError::FingerprintConflict(id));
        }
        Ok(stored)
    }

    /// `PENDING → PROCESSING`, then hand the fingerprint to the network.
    ///
    /// A registration already PROCESSING (or with an attempt in flight) is
    /// returned as-is; only `refresh` resumes it. Losing the status
    /// compare-and-set to another worker also returns the observed record
    /// without submitting.
    pub async fn start(&self, id: &RegistrationId) -> AnchorResult<Registration> {
        let Some(_guard) = self.try_claim(id) else {
            debug!(registration = %id, "anchoring attempt already in flight");
            return self.load(id);
        };

        let registration = self.load(id)?;
        if registration.status != RegistrationStatus::Pending {
            return Ok(registration);
        }

        let outcome = self
            .store
            .transition(id, StatusChange::Start { at: self.clock.now() })?;
        if !outcome.is_applied() {
            debug!(registration = %id, "start lost to a concurrent worker");
            return Ok(outcome.into_registration());
        }
        let registration = self.observe(outcome);
        self.submit_to_network(registration).await
    }

    /// Advance one PROCESSING registration: resume an unsent submission,
    /// poll the network, or fail it past the deadline.
    pub async fn refresh(&self, id: &RegistrationId) -> AnchorResult<Registration> {
        let Some(_guard) = self.try_claim(id) else {
            return self.load(id);
        };

        let registration = self.load(id)?;
        if registration.status != RegistrationStatus::Processing {
            return Ok(registration);
        }

        let Some(reference) = registration.proof_reference.clone() else {
            if self.deadline_passed(&registration) {
                return self.fail_timed_out(registration);
            }
            return self.submit_to_network(registration).await;
        };

        match self.network.poll(&reference).await {
            Ok(NetworkStatus::Confirmed(confirmation)) => self.confirm(registration, &reference, confirmation),
            Ok(NetworkStatus::Rejected { reason }) => {
                self.fail(registration, format!("anchoring rejected by {}: {reason}", self.network.name()))
            }
            Ok(NetworkStatus::Pending) if self.deadline_passed(&registration) => {
                self.fail_timed_out(registration)
            }
            Ok(NetworkStatus::Pending) => Ok(registration),
            Err(e) => {
                warn!(registration = %id, error = %e, "network poll failed");
                if self.deadline_passed(&registration) {
                    return self.fail_timed_out(registration);
                }
                Ok(registration)
            }
        }
    }

    /// Start every PENDING registration and refresh every PROCESSING one.
    pub async fn sweep(&self) -> AnchorResult<SweepReport> {
        let mut report = SweepReport::default();

        for registration in self.store.list_by_status(RegistrationStatus::Pending)? {
            match self.start(&registration.id).await {
                Ok(r) if r.status == RegistrationStatus::Processing => report.started += 1,
                Ok(_) => {}
                Err(e) => {
                    report.errors += 1;
                    warn!(registration = %registration.id, error = %e, "failed to start anchoring");
                }
            }
        }

        for registration in self.store.list_by_status(RegistrationStatus::Processing)? {
            match self.refresh(&registration.id).await {
                Ok(r) => match r.status {
                    RegistrationStatus::Confirmed => report.confirmed += 1,
                    RegistrationStatus::Failed => report.failed += 1,
                    _ => report.still_processing += 1,
                },
                Err(e) => {
                    report.errors += 1;
                    warn!(registration = %registration.id, error = %e, "failed to refresh anchoring");
                }
            }
        }

        report.refunds_retried = self.retry_refunds(&mut report.errors);

        if report != SweepReport::default() {
            debug!(?report, "sweep complete");
        }
        Ok(report)
    }

    /// Explicitly retry a FAILED registration as a new registration.
    pub async fn retry(
        &self,
        principal: &AccountId,
        failed_id: &RegistrationId,
        new_id: Option<RegistrationId>,
    ) -> AnchorResult<Registration> {
        let failed = self.load(failed_id)?;
        Self::ensure_owner(&failed, principal)?;
        if failed.status != RegistrationStatus::Failed {
            return Err(AnchorError::NotRetryable {
                id: *failed_id,
                status: failed.status,
            });
        }
        info!(registration = %failed_id, account = %principal, "retrying failed registration");
        self.submit(
            principal,
            SubmitRequest {
                fingerprint: failed.fingerprint,
                registration_id: new_id,
                retry_of: Some(*failed_id),
            },
        )
        .await
    }

    /// Current state in wire shape.
    pub fn status(&self, id: &RegistrationId) -> AnchorResult<RegistrationStatusResponse> {
        let registration = self.load(id)?;
        let proof = self.store.proof(id)?;
        Ok(registration.to_status_response(proof.as_ref()))
    }

    pub fn certificate(&self, id: &RegistrationId) -> AnchorResult<Certificate> {
        let registration = self.load(id)?;
        let proof = self.store.proof(id)?;
        Certificate::issue(&registration, proof.as_ref())
    }

    fn load(&self, id: &RegistrationId) -> AnchorResult<Registration> {
        self.store.get(id)?.ok_or(AnchorError::NotFound(*id))
    }

    fn ensure_owner(registration: &Registration, principal: &AccountId) -> AnchorResult<()> {
        if registration.is_owned_by(principal) {
            Ok(())
        } else {
            Err(AnchorError::NotOwner {
                registration: registration.id,
                principal: principal.clone(),
            })
        }
    }

    fn try_claim(&self, id: &RegistrationId) -> Option<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(*id).then(|| InFlightGuard {
            set: &self.in_flight,
            id: *id,
        })
    }

    fn deadline_passed(&self, registration: &Registration) -> bool {
        let started = registration
            .processing_started_at
            .unwrap_or(registration.updated_at);
        (self.clock.now() - started)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= self.config.anchoring_timeout)
    }

    async fn submit_to_network(&self, registration: Registration) -> AnchorResult<Registration> {
        match self.network.submit(&registration.fingerprint).await {
            Ok(submission) => {
                info!(
                    registration = %registration.id,
                    network = %submission.network,
                    reference = %submission.proof_reference,
                    "fingerprint submitted for anchoring"
                );
                self.store
                    .record_submission(&registration.id, &submission.proof_reference, self.clock.now())
            }
            Err(e) => {
                warn!(registration = %registration.id, error = %e, "anchoring submission failed; will resume");
                Ok(registration)
            }
        }
    }

    fn confirm(
        &self,
        registration: Registration,
        reference: &str,
        confirmation: Confirmation,
    ) -> AnchorResult<Registration> {
        let proof = AnchoringProof {
            id: uuid::Uuid::now_v7(),
            registration_id: registration.id,
            proof_reference: reference.to_string(),
            network: confirmation.artifact.network.clone(),
            method: confirmation.artifact.method.clone(),
            confirmed_at: Some(confirmation.confirmed_at),
            block_reference: Some(confirmation.block_reference.clone()),
            confirmation_count: Some(confirmation.confirmations),
            artifact: confirmation.artifact,
        };
        let outcome = self.store.transition(
            &registration.id,
            StatusChange::Confirm {
                at: self.clock.now(),
                proof: Box::new(proof),
            },
        )?;
        if outcome.is_applied() {
            info!(
                registration = %registration.id,
                block = %confirmation.block_reference,
                height = confirmation.block_height,
                "registration confirmed"
            );
        }
        Ok(self.observe(outcome))
    }

    fn fail_timed_out(&self, registration: Registration) -> AnchorResult<Registration> {
        let message = format!(
            "{TIMEOUT_MESSAGE_PREFIX}: no confirmation within {}s",
            self.config.anchoring_timeout.as_secs()
        );
        self.fail(registration, message)
    }

    fn fail(&self, registration: Registration, message: String) -> AnchorResult<Registration> {
        let outcome = self.store.transition(
            &registration.id,
            StatusChange::Fail {
                at: self.clock.now(),
                message: message.clone(),
            },
        )?;
        if !outcome.is_applied() {
            return Ok(outcome.into_registration());
        }

        warn!(registration = %registration.id, account = %registration.owner_id, %message, "registration failed");
        if self.config.refund_on_failure {
            if let Err(e) = self.refund(&registration) {
                warn!(registration = %registration.id, error = %e, "refund failed; queued for the next sweep");
                self.lock_refunds().insert(registration.id);
            }
        }
        Ok(self.observe(outcome))
    }

    fn refund(&self, registration: &Registration) -> AnchorResult<()> {
        self.credits.refund_credit(
            &registration.owner_id,
            &registration.id.to_string(),
            "anchoring failed",
        )?;
        debug!(registration = %registration.id, "credit refunded");
        Ok(())
    }

    /// Registrations that failed but whose credit has not been returned yet.
    pub fn refunds_due(&self) -> Vec<RegistrationId> {
        self.lock_refunds().iter().copied().collect()
    }

    /// Re-attempt queued refunds. Returns how many went through; failures
    /// stay queued and are counted into `errors`.
    fn retry_refunds(&self, errors: &mut usize) -> usize {
        let due = self.refunds_due();
        let mut refunded = 0;
        for id in due {
            match self.load(&id).and_then(|r| self.refund(&r)) {
                Ok(()) => {
                    self.lock_refunds().remove(&id);
                    info!(registration = %id, "queued refund applied");
                    refunded += 1;
                }
                Err(e) => {
                    *errors += 1;
                    warn!(registration = %id, error = %e, "queued refund failed again");
                }
            }
        }
        refunded
    }

    fn lock_refunds(&self) -> std::sync::MutexGuard<'_, HashSet<RegistrationId>> {
        self.refunds_due.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish an applied transition and unwrap the resulting record.
    fn observe(&self, outcome: TransitionOutcome) -> Registration {
        if let TransitionOutcome::Applied { from, registration } = &outcome {
            self.events.publish(RegistrationEvent {
                registration_id: registration.id,
                owner_id: registration.owner_id.clone(),
                from: Some(*from),
                to: registration.status,
                at: registration.updated_at,
            });
        }
        outcome.into_registration()
    }
}
