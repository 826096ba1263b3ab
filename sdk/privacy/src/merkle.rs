//! Merkle Tree for Pool Commitments
//!
//! Append-only binary tree of fixed depth holding every shielded commitment.
//! Spending proves membership against a recent root without revealing the
//! leaf position.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               C0  C1 C2   C3  (Commitments)
//! ```
//!
//! Empty leaves are the zero field element; the empty subtree at level
//! `i + 1` is `H(z_i, z_i)`.

use std::collections::HashMap;

use ark_ff::Zero;

use crate::commitment::Commitment;
use crate::error::{PrivacyError, Result};
use crate::hash::{Field, FieldHasher, PoseidonHasher, default_hasher};

/// Tree depth (1024 leaves)
pub const TREE_DEPTH: usize = 10;

/// Number of recent roots a spend may reference
pub const ROOT_HISTORY_SIZE: usize = 30;

/// Authentication path for one leaf
#[derive(Debug, Clone, PartialEq)]
pub struct MerklePath {
    /// Sibling hashes from leaf to root
    pub siblings: Vec<Field>,
    /// Direction bits (false = current node is the left child)
    pub indices: Vec<bool>,
    /// The leaf position
    pub leaf_index: u64,
}

impl MerklePath {
    /// Fold `leaf` up the path and return the resulting root.
    pub fn compute_root<H: FieldHasher>(&self, hasher: &H, leaf: Field) -> Result<Field> {
        fold_path(hasher, leaf, &self.siblings, &self.indices)
    }

    /// Verify that this path proves inclusion of `leaf` under `root`
    pub fn verify<H: FieldHasher>(&self, hasher: &H, leaf: &Commitment, root: Field) -> bool {
        matches!(self.compute_root(hasher, leaf.to_field()), Ok(r) if r == root)
    }
}

/// Fold a leaf bottom-up through `siblings`, ordering each pair by its
/// direction bit. Both slices must have exactly [`TREE_DEPTH`] entries.
pub fn fold_path<H: FieldHasher>(
    hasher: &H,
    leaf: Field,
    siblings: &[Field],
    indices: &[bool],
) -> Result<Field> {
    for len in [siblings.len(), indices.len()] {
        if len != TREE_DEPTH {
            return Err(PrivacyError::PathLength {
                expected: TREE_DEPTH,
                actual: len,
            });
        }
    }

    let mut current = leaf;
    for (sibling, is_right) in siblings.iter().zip(indices) {
        current = if *is_right {
            hasher.hash2(*sibling, current)
        } else {
            hasher.hash2(current, *sibling)
        };
    }
    Ok(current)
}

/// Roots of empty subtrees, `zeros[0]` being the empty leaf.
pub fn empty_roots<H: FieldHasher>(hasher: &H) -> Vec<Field> {
    let mut zeros = Vec::with_capacity(TREE_DEPTH + 1);
    zeros.push(Field::zero());
    for level in 0..TREE_DEPTH {
        let prev = zeros[level];
        zeros.push(hasher.hash2(prev, prev));
    }
    zeros
}

/// Sparse Merkle Tree of commitments
///
/// Only non-empty nodes are stored.
#[derive(Debug, Clone)]
pub struct MerkleTree<H = PoseidonHasher> {
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), Field>,
    /// Leaf index lookup
    leaves: HashMap<Commitment, u64>,
    next_index: u64,
    hasher: H,
    empty_roots: Vec<Field>,
    root: Field,
}

impl MerkleTree<PoseidonHasher> {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::with_hasher(default_hasher().clone())
    }
}

impl Default for MerkleTree<PoseidonHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: FieldHasher> MerkleTree<H> {
    pub fn with_hasher(hasher: H) -> Self {
        let empty_roots = empty_roots(&hasher);
        let root = empty_roots[TREE_DEPTH];
        Self {
            nodes: HashMap::new(),
            leaves: HashMap::new(),
            next_index: 0,
            hasher,
            empty_roots,
            root,
        }
    }

    pub const fn capacity() -> u64 {
        1 << TREE_DEPTH
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Get current root
    pub fn root(&self) -> Field {
        self.root
    }

    /// Number of leaves appended so far
    pub fn len(&self) -> u64 {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    /// Append a commitment and return its leaf index
    pub fn insert(&mut self, commitment: &Commitment) -> Result<u64> {
        let position = self.next_index;
        if position >= Self::capacity() {
            return Err(PrivacyError::TreeFull {
                capacity: Self::capacity(),
            });
        }

        let mut current_index = position;
        let mut current_hash = commitment.to_field();
        self.nodes.insert((0, position), current_hash);

        for level in 0..TREE_DEPTH {
            let is_right = current_index & 1 == 1;
            let sibling = self.node(level, current_index ^ 1);

            current_hash = if is_right {
                self.hasher.hash2(sibling, current_hash)
            } else {
                self.hasher.hash2(current_hash, sibling)
            };
            current_index >>= 1;
            self.nodes.insert((level + 1, current_index), current_hash);
        }

        self.root = current_hash;
        self.leaves.entry(*commitment).or_insert(position);
        self.next_index += 1;
        Ok(position)
    }

    /// Get Merkle path for a leaf index
    pub fn path(&self, position: u64) -> Option<MerklePath> {
        if position >= self.next_index {
            return None;
        }

        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut indices = Vec::with_capacity(TREE_DEPTH);
        let mut current_index = position;

        for level in 0..TREE_DEPTH {
            indices.push(current_index & 1 == 1);
            siblings.push(self.node(level, current_index ^ 1));
            current_index >>= 1;
        }

        Some(MerklePath {
            siblings,
            indices,
            leaf_index: position,
        })
    }

    /// Leaf index of the first occurrence of `commitment`
    pub fn position_of(&self, commitment: &Commitment) -> Option<u64> {
        self.leaves.get(commitment).copied()
    }

    /// Path for `commitment`, if it is in the tree
    pub fn path_for(&self, commitment: &Commitment) -> Option<MerklePath> {
        self.position_of(commitment).and_then(|p| self.path(p))
    }

    /// Get commitment at position
    pub fn get(&self, position: u64) -> Option<Commitment> {
        if position >= self.next_index {
            return None;
        }
        self.nodes.get(&(0, position)).map(|f| Commitment::from_field(*f))
    }

    fn node(&self, level: usize, index: u64) -> Field {
        self.nodes
            .get(&(level, index))
            .copied()
            .unwrap_or(self.empty_roots[level])
    }
}

/// Root history for the Merkle tree
///
/// Stores recent roots so a proof built against a slightly stale root is
/// still accepted after further deposits.
#[derive(Debug, Clone)]
pub struct RootHistory {
    /// Recent roots (most recent first)
    roots: Vec<Field>,
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: Vec::with_capacity(max_size),
            max_size,
        }
    }

    /// Add a new root
    pub fn push(&mut self, root: Field) {
        self.roots.insert(0, root);
        self.roots.truncate(self.max_size);
    }

    /// Check if a root is current or recent
    pub fn is_known(&self, root: &Field) -> bool {
        self.roots.contains(root)
    }

    /// Get the most recent root
    pub fn current(&self) -> Option<&Field> {
        self.roots.first()
    }
}

impl Default for RootHistory {
    fn default() -> Self {
        Self::new(ROOT_HISTORY_SIZE)
    }
}
