use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notary_crypto::ProofArtifact;
use notary_types::Fingerprint;

/// Receipt for a fingerprint handed to the anchoring network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub proof_reference: String,
    pub network: String,
    pub method: String,
}

/// Network-side evidence of inclusion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub block_reference: String,
    pub block_height: u64,
    pub confirmations: u32,
    pub confirmed_at: DateTime<Utc>,
    pub artifact: ProofArtifact,
}

/// Network view of one submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkStatus {
    Pending,
    Confirmed(Confirmation),
    Rejected { reason: String },
}

/// Errors talking to an anchoring network. All are treated as transient by
/// the pipeline; only `NetworkStatus::Rejected` or the deadline fail a
/// registration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("network unavailable: {0}")]
    Unavailable(String),

    #[error("unknown proof reference {0}")]
    UnknownReference(String),

    #[error("proof reference {0} is already sealed into a block")]
    AlreadySealed(String),
}

/// External timestamping network.
#[async_trait]
pub trait AnchorNetwork: Send + Sync {
    /// Network name recorded on proofs.
    fn name(&self) -> &str;

    async fn submit(&self, fingerprint: &Fingerprint) -> Result<Submission, NetworkError>;

    async fn poll(&self, proof_reference: &str) -> Result<NetworkStatus, NetworkError>;
}
