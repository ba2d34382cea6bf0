use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use notary_types::{AccountId, Fingerprint, RegistrationId, RegistrationStatus};

use crate::error::{AnchorError, AnchorResult};
use crate::registration::{AnchoringProof, Registration};

/// A requested state machine step.
#[derive(Clone, Debug)]
pub enum StatusChange {
    /// `PENDING → PROCESSING`.
    Start { at: DateTime<Utc> },
    /// `PROCESSING → CONFIRMED`, storing the proof in the same write.
    Confirm {
        at: DateTime<Utc>,
        proof: Box<AnchoringProof>,
    },
    /// `PROCESSING → FAILED`.
    Fail { at: DateTime<Utc>, message: String },
}

impl StatusChange {
    pub fn target(&self) -> RegistrationStatus {
        match self {
            Self::Start { .. } => RegistrationStatus::Processing,
            Self::Confirm { .. } => RegistrationStatus::Confirmed,
            Self::Fail { .. } => RegistrationStatus::Failed,
        }
    }
}

/// Result of a transition request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The registration moved to the requested state.
    Applied {
        from: RegistrationStatus,
        registration: Registration,
    },
    /// Already at or past the requested state; nothing changed.
    Unchanged(Registration),
}

impl TransitionOutcome {
    pub fn registration(&self) -> &Registration {
        match self {
            Self::Applied { registration, .. } | Self::Unchanged(registration) => registration,
        }
    }

    pub fn into_registration(self) -> Registration {
        match self {
            Self::Applied { registration, .. } | Self::Unchanged(registration) => registration,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Persistence boundary for registrations and their proofs.
///
/// `transition` is a compare-and-set on status: it applies only legal
/// single-step moves, is a no-op from a terminal state or when the target
/// was already reached, and writes a confirmation's proof atomically with
/// the status change.
pub trait RegistrationStore: Send + Sync {
    /// Insert unless the id exists. Returns the stored record and whether
    /// it was created by this call.
    fn insert(&self, registration: Registration) -> AnchorResult<(Registration, bool)>;

    fn get(&self, id: &RegistrationId) -> AnchorResult<Option<Registration>>;

    fn proof(&self, id: &RegistrationId) -> AnchorResult<Option<AnchoringProof>>;

    fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> AnchorResult<Vec<Registration>>;

    fn list_by_status(&self, status: RegistrationStatus) -> AnchorResult<Vec<Registration>>;

    fn list_by_owner(&self, owner: &AccountId) -> AnchorResult<Vec<Registration>>;

    fn transition(&self, id: &RegistrationId, change: StatusChange) -> AnchorResult<TransitionOutcome>;

    /// Record the network handle of a PROCESSING registration.
    fn record_submission(
        &self,
        id: &RegistrationId,
        proof_reference: &str,
        at: DateTime<Utc>,
    ) -> AnchorResult<Registration>;
}

/// In-memory registration store.
///
/// Records are never evicted, so memory grows with every registration.
/// Suited to development servers and tests.
#[derive(Default)]
pub struct InMemoryRegistrationStore {
    inner: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    registrations: HashMap<RegistrationId, Registration>,
    proofs: HashMap<RegistrationId, AnchoringProof>,
}

impl InMemoryRegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AnchorResult<RwLockReadGuard<'_, StoreState>> {
        self.inner
            .read()
            .map_err(|_| AnchorError::LockPoisoned("registration store"))
    }

    fn write(&self) -> AnchorResult<RwLockWriteGuard<'_, StoreState>> {
        self.inner
            .write()
            .map_err(|_| AnchorError::LockPoisoned("registration store"))
    }

    fn collect(&self, pred: impl Fn(&Registration) -> bool) -> AnchorResult<Vec<Registration>> {
        let state = self.read()?;
        let mut out: Vec<Registration> = state
            .registrations
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.created_at, r.id));
        Ok(out)
    }
}

impl RegistrationStore for InMemoryRegistrationStore {
    fn insert(&self, registration: Registration) -> AnchorResult<(Registration, bool)> {
        let mut state = self.write()?;
        if let Some(existing) = state.registrations.get(&registration.id) {
            return Ok((existing.clone(), false));
        }
        state
            .registrations
            .insert(registration.id, registration.clone());
        Ok((registration, true))
    }

    fn get(&self, id: &RegistrationId) -> AnchorResult<Option<Registration>> {
        Ok(self.read()?.registrations.get(id).cloned())
    }

    fn proof(&self, id: &RegistrationId) -> AnchorResult<Option<AnchoringProof>> {
        Ok(self.read()?.proofs.get(id).cloned())
    }

    fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> AnchorResult<Vec<Registration>> {
        self.collect(|r| r.fingerprint == *fingerprint)
    }

    fn list_by_status(&self, status: RegistrationStatus) -> AnchorResult<Vec<Registration>> {
        self.collect(|r| r.status == status)
    }

    fn list_by_owner(&self, owner: &AccountId) -> AnchorResult<Vec<Registration>> {
        self.collect(|r| r.owner_id == *owner)
    }

    fn transition(&self, id: &RegistrationId, change: StatusChange) -> AnchorResult<TransitionOutcome> {
        let mut state = self.write()?;
        let current = state
            .registrations
            .get(id)
            .cloned()
            .ok_or(AnchorError::NotFound(*id))?;

        let target = change.target();
        if current.status.is_terminal() || current.status == target {
            return Ok(TransitionOutcome::Unchanged(current));
        }
        if !current.status.can_transition_to(target) {
            return Err(AnchorError::IllegalTransition {
                id: *id,
                from: current.status,
                to: target,
            });
        }

        let from = current.status;
        let mut next = current;
        next.status = target;
        match change {
            StatusChange::Start { at } => {
                next.updated_at = at;
                next.processing_started_at = Some(at);
            }
            StatusChange::Confirm { at, proof } => {
                next.updated_at = at;
                next.confirmed_at = Some(proof.confirmed_at.unwrap_or(at));
                next.proof_reference = Some(proof.proof_reference.clone());
                state.proofs.insert(*id, *proof);
            }
            StatusChange::Fail { at, message } => {
                next.updated_at = at;
                next.error_message = Some(message);
            }
        }
        state.registrations.insert(*id, next.clone());

        Ok(TransitionOutcome::Applied {
            from,
            registration: next,
        })
    }

    fn record_submission(
        &self,
        id: &RegistrationId,
        proof_reference: &str,
        at: DateTime<Utc>,
    ) -> AnchorResult<Registration> {
        let mut state = self.write()?;
        let registration = state
            .registrations
            .get_mut(id)
            .ok_or(AnchorError::NotFound(*id))?;
        if registration.status == RegistrationStatus::Processing {
            registration.proof_reference = Some(proof_reference.to_string());
            registration.updated_at = at;
        }
        Ok(registration.clone())
    }
}
