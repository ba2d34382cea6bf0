//! Cryptographic primitives for Notary.
//!
//! Provides the SHA-256 fingerprint generator, domain-separated BLAKE3
//! hashing, ledger hash-chain verification, binary Merkle trees with
//! inclusion proofs, Ed25519 signing, and the portable proof artifact that
//! lets any third party check an anchoring without talking to Notary.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod artifact;
pub mod chain;
pub mod fingerprint;
pub mod hasher;
pub mod merkle;
pub mod signer;

pub use artifact::{ArtifactError, ArtifactState, Attestation, ProofArtifact, ARTIFACT_VERSION};
pub use chain::{ChainError, ChainLink, HashChainVerifier};
pub use fingerprint::{fingerprint_bytes, fingerprint_file, fingerprint_reader, FingerprintError};
pub use hasher::{ContentHasher, HasherError, NodeHash};
pub use merkle::{MerkleProof, MerkleTree, PathStep, Side};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
