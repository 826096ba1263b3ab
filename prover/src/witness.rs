//! Witness and public-input types shared by both circuits.

use ark_bn254::Fr;
use whalevault_privacy::{
    Commitment, CommitmentScheme, FieldHasher, MerklePath, Nullifier, Secret, TREE_DEPTH,
    field_from_bytes, field_to_bytes,
};

use crate::constants::PUBLIC_INPUT_SIZE;
use crate::error::{ProverError, Result};

/// Private data proving ownership of one leaf.
#[derive(Clone, Debug)]
pub struct SpendWitness {
    pub secret: Secret,
    pub siblings: Vec<Fr>,
    pub indices: Vec<bool>,
}

impl SpendWitness {
    pub fn new(secret: Secret, path: &MerklePath) -> Result<Self> {
        if path.siblings.len() != TREE_DEPTH || path.indices.len() != TREE_DEPTH {
            return Err(ProverError::Witness(whalevault_privacy::PrivacyError::PathLength {
                expected: TREE_DEPTH,
                actual: path.siblings.len().min(path.indices.len()),
            }));
        }
        Ok(Self {
            secret,
            siblings: path.siblings.clone(),
            indices: path.indices.clone(),
        })
    }

    /// All-zero witness used for key generation.
    pub fn blank() -> Self {
        Self {
            secret: Secret::from_bytes([0u8; 32]),
            siblings: vec![Fr::from(0u64); TREE_DEPTH],
            indices: vec![false; TREE_DEPTH],
        }
    }
}

/// Public inputs of the withdraw circuit, in verifier order.
#[derive(Clone, Debug, PartialEq)]
pub struct WithdrawPublicInputs {
    pub root: Fr,
    pub nullifier_hash: Fr,
    /// Recipient address bytes, reduced into the field
    pub recipient: [u8; 32],
    pub amount: u64,
}

impl WithdrawPublicInputs {
    pub fn to_field_elements(&self) -> Vec<Fr> {
        vec![
            self.root,
            self.nullifier_hash,
            field_from_bytes(&self.recipient),
            Fr::from(self.amount),
        ]
    }
}

/// Public inputs of the transfer circuit, in verifier order.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferPublicInputs {
    pub root: Fr,
    pub nullifier_hash: Fr,
    pub new_commitment: Fr,
    pub amount: u64,
}

impl TransferPublicInputs {
    pub fn to_field_elements(&self) -> Vec<Fr> {
        vec![
            self.root,
            self.nullifier_hash,
            self.new_commitment,
            Fr::from(self.amount),
        ]
    }
}

/// Encode public inputs as 32-byte big-endian words.
pub fn public_inputs_to_bytes(inputs: &[Fr]) -> Vec<[u8; PUBLIC_INPUT_SIZE]> {
    inputs.iter().map(|f| field_to_bytes(*f)).collect()
}

/// Decode 32-byte big-endian words.
pub fn public_inputs_from_bytes(inputs: &[[u8; PUBLIC_INPUT_SIZE]]) -> Vec<Fr> {
    inputs.iter().map(field_from_bytes).collect()
}

/// Everything a spend needs that is derived from (amount, secret) and the
/// current tree: the commitment, its nullifier, and the membership witness.
#[derive(Clone, Debug)]
pub struct SpendStatement {
    pub commitment: Commitment,
    pub nullifier: Nullifier,
    pub root: Fr,
    pub witness: SpendWitness,
}

impl SpendStatement {
    /// Build the statement, checking natively that `path` leads from the
    /// commitment to `root`.
    pub fn build<H: FieldHasher>(
        scheme: &CommitmentScheme<H>,
        amount: u64,
        secret: Secret,
        path: &MerklePath,
        root: Fr,
    ) -> Result<Self> {
        let commitment = scheme.commit(amount, &secret)?;
        let computed = path.compute_root(scheme.hasher(), commitment.to_field())?;
        if computed != root {
            return Err(ProverError::RootMismatch);
        }
        let nullifier = scheme.nullifier(&commitment, &secret);
        Ok(Self {
            commitment,
            nullifier,
            root,
            witness: SpendWitness::new(secret, path)?,
        })
    }
}
