//! Registration state machine and anchoring pipeline.
//!
//! A registration moves `PENDING → PROCESSING → {CONFIRMED | FAILED}`.
//! The pipeline pays for it through the credit consumption contract,
//! submits its fingerprint to an [`AnchorNetwork`], and records an
//! [`AnchoringProof`] atomically with confirmation. Terminal records are
//! never mutated; a retry is a new registration.

pub mod calendar;
pub mod certificate;
pub mod error;
pub mod events;
pub mod network;
pub mod pipeline;
pub mod registration;
pub mod store;

pub use calendar::{LocalCalendar, SealedBlock, CALENDAR_METHOD};
pub use certificate::Certificate;
pub use error::{AnchorError, AnchorResult};
pub use events::{RegistrationEvent, RegistrationEvents};
pub use network::{AnchorNetwork, Confirmation, NetworkError, NetworkStatus, Submission};
pub use pipeline::{
    AnchoringPipeline, PipelineConfig, SubmitRequest, SweepReport, DEFAULT_ANCHORING_TIMEOUT,
    TIMEOUT_MESSAGE_PREFIX,
};
pub use registration::{AnchoringProof, Registration};
pub use store::{InMemoryRegistrationStore, RegistrationStore, StatusChange, TransitionOutcome};
