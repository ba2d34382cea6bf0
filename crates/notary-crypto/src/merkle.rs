use notary_types::Fingerprint;
use serde::{Deserialize, Serialize};

use crate::hasher::{ContentHasher, NodeHash};

/// Side of a sibling in a Merkle proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// Binary Merkle tree over a batch of fingerprints.
///
/// The anchoring calendar aggregates every fingerprint submitted since the
/// last seal into one tree and attests only the root; each submitter gets an
/// inclusion proof from its fingerprint to that root.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    leaves: Vec<Fingerprint>,
    /// Level 0 = leaf hashes, last level = [root].
    levels: Vec<Vec<NodeHash>>,
}

impl MerkleTree {
    /// Build a tree. Returns `None` for an empty batch.
    pub fn from_leaves(leaves: Vec<Fingerprint>) -> Option<Self> {
        if leaves.is_empty() {
            return None;
        }

        let mut current: Vec<NodeHash> = leaves.iter().map(leaf_hash).collect();
        let mut levels = vec![current.clone()];

        while current.len() > 1 {
            let next: Vec<NodeHash> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    // Odd node: hash with itself
                    [single] => hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two elements"),
                })
                .collect();
            levels.push(next.clone());
            current = next;
        }

        Some(Self { leaves, levels })
    }

    pub fn root(&self) -> NodeHash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(|| NodeHash::from_bytes([0; 32]))
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaves(&self) -> &[Fingerprint] {
        &self.leaves
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaves.len() {
            return None;
        }

        let mut path = Vec::new();
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            let sibling = level.get(sibling_idx).copied().unwrap_or(level[idx]);
            let side = if idx % 2 == 0 { Side::Right } else { Side::Left };
            path.push(PathStep { sibling, side });
            idx /= 2;
        }

        Some(MerkleProof {
            leaf: self.leaves[index],
            path,
            root: self.root(),
        })
    }
}

/// One step of an inclusion path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub sibling: NodeHash,
    pub side: Side,
}

/// Merkle inclusion proof from a fingerprint to a root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: Fingerprint,
    pub path: Vec<PathStep>,
    pub root: NodeHash,
}

impl MerkleProof {
    /// Recompute the root from the leaf and path.
    pub fn computed_root(&self) -> NodeHash {
        self.path
            .iter()
            .fold(leaf_hash(&self.leaf), |current, step| match step.side {
                Side::Left => hash_pair(&step.sibling, &current),
                Side::Right => hash_pair(&current, &step.sibling),
            })
    }

    /// `true` if the path leads from the leaf to the stated root.
    pub fn verify(&self) -> bool {
        self.computed_root() == self.root
    }
}

fn leaf_hash(leaf: &Fingerprint) -> NodeHash {
    ContentHasher::MERKLE_LEAF.hash(leaf.as_bytes())
}

fn hash_pair(left: &NodeHash, right: &NodeHash) -> NodeHash {
    ContentHasher::MERKLE_NODE.hash_parts(&[left.as_bytes(), right.as_bytes()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(seed: u8) -> Fingerprint {
        Fingerprint::from_digest([seed; 32])
    }

    #[test]
    fn empty_batch_has_no_tree() {
        assert!(MerkleTree::from_leaves(vec![]).is_none());
    }

    #[test]
    fn single_leaf_proof_has_empty_path() {
        let tree = MerkleTree::from_leaves(vec![leaf(1)]).unwrap();
        let proof = tree.proof(0).unwrap();
        assert!(proof.path.is_empty());
        assert!(proof.verify());
    }

    #[test]
    fn proof_verifies_for_all_leaves() {
        let leaves: Vec<Fingerprint> = (0..7).map(leaf).collect();
        let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();

        for (i, expected) in leaves.iter().enumerate() {
            let proof = tree.proof(i).expect("proof should exist");
            assert_eq!(proof.leaf, *expected);
            assert!(proof.verify(), "proof for leaf {i} should verify");
        }
    }

    #[test]
    fn proof_out_of_bounds_returns_none() {
        let tree = MerkleTree::from_leaves(vec![leaf(1), leaf(2)]).unwrap();
        assert!(tree.proof(5).is_none());
    }

    #[test]
    fn swapped_leaf_fails_verification() {
        let tree = MerkleTree::from_leaves(vec![leaf(1), leaf(2), leaf(3), leaf(4)]).unwrap();
        let mut proof = tree.proof(0).unwrap();
        proof.leaf = leaf(99);
        assert!(!proof.verify());
    }

    #[test]
    fn power_of_two_path_length() {
        let tree = MerkleTree::from_leaves((0..8).map(leaf).collect()).unwrap();
        for i in 0..8 {
            let proof = tree.proof(i).unwrap();
            assert!(proof.verify());
            assert_eq!(proof.path.len(), 3);
        }
    }

    #[test]
    fn proof_survives_json() {
        let tree = MerkleTree::from_leaves(vec![leaf(1), leaf(2), leaf(3)]).unwrap();
        let proof = tree.proof(2).unwrap();
        let json = serde_json::to_string(&proof).unwrap();
        assert!(json.contains("\"side\":\"left\"") || json.contains("\"side\":\"right\""));
        let parsed: MerkleProof = serde_json::from_str(&json).unwrap();
        assert!(parsed.verify());
    }
}
