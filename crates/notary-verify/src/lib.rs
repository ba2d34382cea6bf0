//! Proof verification.
//!
//! Two modes:
//! - fingerprint only: format gate, then a registry lookup whose stored
//!   artifact is re-checked before answering `VERIFIED`
//! - content (or fingerprint) plus proof artifact: a fully offline check
//!   that never consults the registry

pub mod error;
pub mod lookup;
pub mod result;
pub mod verifier;

pub use error::VerifyError;
pub use lookup::RegistryLookup;
pub use result::{ProofSummary, RegistrationSummary, VerificationResult, VerificationStatus};
pub use verifier::{ProofVerifier, Subject, VerifierConfig, VerifyInput, DEFAULT_LEGAL_NOTICE};
