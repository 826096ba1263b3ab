use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_r1cs_std::{fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use crate::circuit::hash::hash2;
use crate::constants::TREE_DEPTH;

/// In-circuit Merkle membership check.
///
/// Folds `leaf` bottom-up through `siblings`. Direction bit 0 keeps the
/// current node on the left, 1 moves it to the right. Each bit is a field
/// variable constrained by `b * (1 - b) = 0`.
pub struct MerkleChecker<'a> {
    config: &'a PoseidonConfig<Fr>,
}

impl<'a> MerkleChecker<'a> {
    pub fn new(config: &'a PoseidonConfig<Fr>) -> Self {
        Self { config }
    }

    /// Allocate `TREE_DEPTH` sibling and direction witnesses.
    ///
    /// `siblings` / `indices` are `None` during key generation.
    pub fn alloc_path(
        cs: ConstraintSystemRef<Fr>,
        siblings: Option<&[Fr]>,
        indices: Option<&[bool]>,
    ) -> Result<(Vec<FpVar<Fr>>, Vec<FpVar<Fr>>), SynthesisError> {
        let mut sibling_vars = Vec::with_capacity(TREE_DEPTH);
        let mut index_vars = Vec::with_capacity(TREE_DEPTH);

        for level in 0..TREE_DEPTH {
            sibling_vars.push(FpVar::new_witness(cs.clone(), || {
                siblings
                    .and_then(|s| s.get(level).copied())
                    .ok_or(SynthesisError::AssignmentMissing)
            })?);
            index_vars.push(FpVar::new_witness(cs.clone(), || {
                indices
                    .and_then(|i| i.get(level).copied())
                    .map(|bit| Fr::from(bit as u64))
                    .ok_or(SynthesisError::AssignmentMissing)
            })?);
        }

        Ok((sibling_vars, index_vars))
    }

    /// Enforce that folding `leaf` through the path yields `root`.
    pub fn enforce(
        &self,
        cs: ConstraintSystemRef<Fr>,
        leaf: &FpVar<Fr>,
        root: &FpVar<Fr>,
        siblings: &[FpVar<Fr>],
        indices: &[FpVar<Fr>],
    ) -> Result<(), SynthesisError> {
        if siblings.len() != TREE_DEPTH || indices.len() != TREE_DEPTH {
            return Err(SynthesisError::Unsatisfiable);
        }

        let mut current = leaf.clone();
        for (sibling, bit) in siblings.iter().zip(indices) {
            bit.mul_equals(&(FpVar::one() - bit), &FpVar::zero())?;

            // bit = 0: (current, sibling)    bit = 1: (sibling, current)
            let diff = sibling - &current;
            let left = &current + bit * &diff;
            let right = sibling - bit * &diff;

            current = hash2(cs.clone(), self.config, &left, &right)?;
        }

        current.enforce_equal(root)
    }
}
