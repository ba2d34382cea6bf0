use notary_anchor::{AnchoringProof, Registration, RegistrationStore};
use notary_types::{Fingerprint, RegistrationId};

use crate::error::VerifyError;

/// Read-only registry view used by fingerprint-only verification.
pub trait RegistryLookup: Send + Sync {
    fn registrations_for(&self, fingerprint: &Fingerprint) -> Result<Vec<Registration>, VerifyError>;

    fn proof_for(&self, id: &RegistrationId) -> Result<Option<AnchoringProof>, VerifyError>;
}

impl<T: RegistrationStore + ?Sized> RegistryLookup for T {
    fn registrations_for(&self, fingerprint: &Fingerprint) -> Result<Vec<Registration>, VerifyError> {
        Ok(self.find_by_fingerprint(fingerprint)?)
    }

    fn proof_for(&self, id: &RegistrationId) -> Result<Option<AnchoringProof>, VerifyError> {
        Ok(self.proof(id)?)
    }
}
