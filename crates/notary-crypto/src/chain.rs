use crate::hasher::ContentHasher;

/// An element of an append-only hash chain.
pub trait ChainLink {
    /// The element's own hash.
    fn entry_hash(&self) -> [u8; 32];
    /// The previous element's hash (None for the first element).
    fn prev_hash(&self) -> Option<[u8; 32]>;
    /// Canonical payload bytes covered by the hash.
    fn payload_bytes(&self) -> Vec<u8>;
}

/// Hash chain integrity verifier.
///
/// Verifies that a sequence forms a valid hash chain: each element's
/// `prev_hash` matches the previous element's `entry_hash`, and each hash is
/// correctly computed from its payload.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a chain.
    ///
    /// Checks:
    /// 1. First element has no previous hash
    /// 2. Each subsequent element's prev_hash matches the previous entry_hash
    /// 3. Each element's hash is correct for its payload
    pub fn verify_chain(links: &[impl ChainLink]) -> Result<(), ChainError> {
        let mut expected_prev: Option<[u8; 32]> = None;

        for (index, link) in links.iter().enumerate() {
            match (expected_prev, link.prev_hash()) {
                (None, Some(_)) => return Err(ChainError::GenesisHasPrevHash),
                (Some(_), None) => return Err(ChainError::MissingPrevHash { index }),
                (Some(expected), Some(actual)) if expected != actual => {
                    return Err(ChainError::BrokenLink { index })
                }
                _ => {}
            }

            let computed = Self::compute_hash(&link.payload_bytes(), expected_prev);
            if computed != link.entry_hash() {
                return Err(ChainError::HashMismatch { index });
            }
            expected_prev = Some(link.entry_hash());
        }

        Ok(())
    }

    /// Compute the expected hash for a payload and optional previous hash.
    pub fn compute_hash(payload: &[u8], prev_hash: Option<[u8; 32]>) -> [u8; 32] {
        let prev = prev_hash.unwrap_or([0; 32]);
        *ContentHasher::LEDGER_ENTRY
            .hash_parts(&[&[u8::from(prev_hash.is_some())], &prev, payload])
            .as_bytes()
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("first entry has a previous hash (should be None)")]
    GenesisHasPrevHash,

    #[error("broken link at index {index}: prev_hash does not match")]
    BrokenLink { index: usize },

    #[error("missing prev_hash at index {index} (should reference previous entry)")]
    MissingPrevHash { index: usize },

    #[error("hash mismatch at index {index}: computed hash differs from stored")]
    HashMismatch { index: usize },
}
