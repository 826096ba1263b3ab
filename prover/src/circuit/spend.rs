use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_r1cs_std::{fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

use crate::circuit::{hash::hash2, merkle::MerkleChecker};
use crate::witness::SpendWitness;

/// Constraints shared by withdraw and transfer:
///
/// ```text
/// commitment = H(amount, secret)
/// commitment ∈ tree(root)
/// nullifier_hash = H(commitment, secret)
/// ```
pub fn enforce_spend(
    cs: ConstraintSystemRef<Fr>,
    config: &PoseidonConfig<Fr>,
    amount: &FpVar<Fr>,
    root: &FpVar<Fr>,
    nullifier_hash: &FpVar<Fr>,
    spend: Option<&SpendWitness>,
) -> Result<(), SynthesisError> {
    let secret = FpVar::new_witness(cs.clone(), || {
        spend
            .map(|s| s.secret.to_field())
            .ok_or(SynthesisError::AssignmentMissing)
    })?;
    let (siblings, indices) = MerkleChecker::alloc_path(
        cs.clone(),
        spend.map(|s| s.siblings.as_slice()),
        spend.map(|s| s.indices.as_slice()),
    )?;

    let commitment = hash2(cs.clone(), config, amount, &secret)?;

    MerkleChecker::new(config).enforce(cs.clone(), &commitment, root, &siblings, &indices)?;

    let nullifier = hash2(cs, config, &commitment, &secret)?;
    nullifier.enforce_equal(nullifier_hash)
}
