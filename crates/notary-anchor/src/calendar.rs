//! In-process anchoring calendar.
//!
//! Fingerprints submitted between seals are batched into one Merkle tree.
//! Sealing signs the root with the calendar key and appends a block; each
//! submitter's proof is the Merkle path to that root plus the signed
//! attestation. A block counts as confirmed once `required_confirmations`
//! blocks (itself included) exist at or above its height.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use notary_crypto::{
    Attestation, MerkleTree, NodeHash, ProofArtifact, SigningKey, VerifyingKey, ARTIFACT_VERSION,
};
use notary_types::{Clock, Fingerprint, SystemClock};
use tracing::{debug, info};

use crate::network::{AnchorNetwork, Confirmation, NetworkError, NetworkStatus, Submission};

/// Anchoring method recorded on calendar proofs.
pub const CALENDAR_METHOD: &str = "merkle-calendar";

/// Summary of a sealed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedBlock {
    pub height: u64,
    pub reference: String,
    pub root: NodeHash,
    pub leaf_count: usize,
}

struct Block {
    reference: String,
    tree: MerkleTree,
    attestation: Attestation,
}

enum Slot {
    Queued(Fingerprint),
    Sealed { block: usize, leaf: usize },
    Rejected(String),
}

/// Slots and blocks are kept for the lifetime of the calendar so every
/// issued reference stays pollable; nothing is evicted.
#[derive(Default)]
struct CalendarState {
    queue: Vec<String>,
    slots: HashMap<String, Slot>,
    blocks: Vec<Block>,
}

/// Local calendar network backed by a signing key.
///
/// All state lives in memory and grows with every submission and seal. It
/// backs development servers and tests, not long-running deployments.
pub struct LocalCalendar {
    name: String,
    key: SigningKey,
    clock: Arc<dyn Clock>,
    required_confirmations: u32,
    state: Mutex<CalendarState>,
}

impl LocalCalendar {
    pub fn new(name: impl Into<String>, key: SigningKey) -> Self {
        Self {
            name: name.into(),
            key,
            clock: Arc::new(SystemClock),
            required_confirmations: 1,
            state: Mutex::new(CalendarState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_required_confirmations(mut self, confirmations: u32) -> Self {
        self.required_confirmations = confirmations.max(1);
        self
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    pub fn height(&self) -> Result<u64, NetworkError> {
        Ok(self.lock()?.blocks.len() as u64)
    }

    pub fn queued(&self) -> Result<usize, NetworkError> {
        Ok(self.lock()?.queue.len())
    }

    /// Seal all queued fingerprints into a new block. Returns `None` when
    /// nothing is queued.
    pub fn seal(&self) -> Result<Option<SealedBlock>, NetworkError> {
        let mut state = self.lock()?;
        let references = std::mem::take(&mut state.queue);
        let leaves: Vec<Fingerprint> = references
            .iter()
            .filter_map(|r| match state.slots.get(r) {
                Some(Slot::Queued(fp)) => Some(*fp),
                _ => None,
            })
            .collect();
        let Some(tree) = MerkleTree::from_leaves(leaves) else {
            return Ok(None);
        };

        let height = state.blocks.len() as u64 + 1;
        let root = tree.root();
        let reference = format!("blk-{height:08}-{}", &root.to_hex()[..16]);
        let attested_at = self.clock.now();
        let message =
            Attestation::signing_message(&self.name, &root, &reference, height, attested_at);
        let attestation = Attestation {
            root,
            block_reference: reference.clone(),
            block_height: height,
            attested_at,
            calendar_key: self.key.verifying_key(),
            signature: self.key.sign(&message),
        };

        let block_index = state.blocks.len();
        let mut leaf = 0;
        for r in &references {
            if let Some(slot) = state.slots.get_mut(r) {
                if matches!(slot, Slot::Queued(_)) {
                    *slot = Slot::Sealed {
                        block: block_index,
                        leaf,
                    };
                    leaf += 1;
                }
            }
        }

        let sealed = SealedBlock {
            height,
            reference: reference.clone(),
            root,
            leaf_count: tree.leaf_count(),
        };
        state.blocks.push(Block {
            reference,
            tree,
            attestation,
        });
        info!(height, leaves = sealed.leaf_count, block = %sealed.reference, "calendar block sealed");
        Ok(Some(sealed))
    }

    /// Mark a queued submission as rejected by the network. A sealed
    /// submission is already attested and cannot be rejected; rejecting
    /// twice keeps the first reason.
    pub fn reject(&self, proof_reference: &str, reason: impl Into<String>) -> Result<(), NetworkError> {
        let mut state = self.lock()?;
        let slot = state
            .slots
            .get_mut(proof_reference)
            .ok_or_else(|| NetworkError::UnknownReference(proof_reference.to_string()))?;
        match slot {
            Slot::Sealed { .. } => {
                return Err(NetworkError::AlreadySealed(proof_reference.to_string()))
            }
            Slot::Rejected(_) => return Ok(()),
            Slot::Queued(_) => {}
        }
        *slot = Slot::Rejected(reason.into());
        state.queue.retain(|r| r != proof_reference);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, CalendarState>, NetworkError> {
        self.state
            .lock()
            .map_err(|_| NetworkError::Unavailable("calendar state lock poisoned".into()))
    }
}

#[async_trait]
impl AnchorNetwork for LocalCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, fingerprint: &Fingerprint) -> Result<Submission, NetworkError> {
        let reference = format!("cal-{}", uuid::Uuid::now_v7().simple());
        let mut state = self.lock()?;
        state.queue.push(reference.clone());
        state
            .slots
            .insert(reference.clone(), Slot::Queued(*fingerprint));
        debug!(fingerprint = %fingerprint.short_hex(), reference = %reference, "fingerprint queued");
        Ok(Submission {
            proof_reference: reference,
            network: self.name.clone(),
            method: CALENDAR_METHOD.to_string(),
        })
    }

    async fn poll(&self, proof_reference: &str) -> Result<NetworkStatus, NetworkError> {
        let state = self.lock()?;
        let slot = state
            .slots
            .get(proof_reference)
            .ok_or_else(|| NetworkError::UnknownReference(proof_reference.to_string()))?;

        let (block_index, leaf) = match slot {
            Slot::Queued(_) => return Ok(NetworkStatus::Pending),
            Slot::Rejected(reason) => {
                return Ok(NetworkStatus::Rejected {
                    reason: reason.clone(),
                })
            }
            Slot::Sealed { block, leaf } => (*block, *leaf),
        };

        let confirmations = (state.blocks.len() - block_index) as u32;
        if confirmations < self.required_confirmations {
            return Ok(NetworkStatus::Pending);
        }

        let block = &state.blocks[block_index];
        let merkle = block
            .tree
            .proof(leaf)
            .ok_or_else(|| NetworkError::Unavailable(format!("block {} lost leaf {leaf}", block.reference)))?;
        Ok(NetworkStatus::Confirmed(Confirmation {
            block_reference: block.reference.clone(),
            block_height: block.attestation.block_height,
            confirmations,
            confirmed_at: block.attestation.attested_at,
            artifact: ProofArtifact {
                version: ARTIFACT_VERSION,
                fingerprint: merkle.leaf,
                network: self.name.clone(),
                method: CALENDAR_METHOD.to_string(),
                merkle,
                attestation: Some(block.attestation.clone()),
            },
        }))
    }
}
