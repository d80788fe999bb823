//! Merkle commitments over transaction and account hashes
//!
//! Nodes are combined strictly by tree position: `parent = hash_data(left, right)`,
//! with the last node of an odd-length level paired with itself. Proofs record
//! which side each sibling sits on, so verification replays exactly the
//! combinations the builder performed.

use crate::crypto::{hash_data, Hash};
use serde::{Deserialize, Serialize};

fn combine(left: &Hash, right: &Hash) -> Hash {
    hash_data(&[left.as_slice(), right.as_slice()])
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => combine(left, right),
            [single] => combine(single, single),
            _ => unreachable!("chunks(2) yields one or two items"),
        })
        .collect()
}

/// Root over `leaves`; `None` when there are no leaves, the leaf itself when there is one.
pub fn build_merkle_root(leaves: &[Hash]) -> Option<Hash> {
    if leaves.is_empty() {
        return None;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.first().copied()
}

/// Which side of the running hash a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Hash,
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Recompute the root from `leaf` and compare.
    pub fn verify(&self, leaf: &Hash, root: &Hash) -> bool {
        let computed = self.steps.iter().fold(*leaf, |current, step| match step.side {
            Side::Left => combine(&step.sibling, &current),
            Side::Right => combine(&current, &step.sibling),
        });
        computed == *root
    }
}

/// Every level of the tree, kept so proofs can be extracted.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    pub fn new(leaves: &[Hash]) -> Self {
        let mut levels = Vec::new();
        if !leaves.is_empty() {
            levels.push(leaves.to_vec());
            while levels.last().map_or(0, Vec::len) > 1 {
                let next = next_level(levels.last().map(Vec::as_slice).unwrap_or(&[]));
                levels.push(next);
            }
        }
        Self { levels }
    }

    pub fn root(&self) -> Option<Hash> {
        self.levels.last().and_then(|top| top.first().copied())
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn proof(&self, leaf_index: usize) -> Option<MerkleProof> {
        if leaf_index >= self.leaf_count() {
            return None;
        }

        let mut steps = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if index % 2 == 0 {
                // Odd tail: the node was paired with itself.
                let sibling = level.get(index + 1).unwrap_or(&level[index]);
                ProofStep {
                    sibling: *sibling,
                    side: Side::Right,
                }
            } else {
                ProofStep {
                    sibling: level[index - 1],
                    side: Side::Left,
                }
            };
            steps.push(step);
            index /= 2;
        }

        Some(MerkleProof { leaf_index, steps })
    }
}
