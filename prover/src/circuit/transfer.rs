//! Transfer Circuit
//!
//! Spends one commitment and creates a new one of the same amount owned by
//! a fresh recipient secret.
//!
//! ```text
//! Public Inputs (in order):
//!   - root
//!   - nullifier_hash:  H(commitment, secret)
//!   - new_commitment:  H(amount, recipient_secret)
//!   - amount
//!
//! Private Witness:
//!   - secret, path_elements[TREE_DEPTH], path_indices[TREE_DEPTH]
//!   - recipient_secret
//! ```

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_r1cs_std::{fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use whalevault_privacy::{Secret, default_hasher};

use crate::circuit::{hash::hash2, spend::enforce_spend};
use crate::witness::{SpendWitness, TransferPublicInputs};

#[derive(Clone)]
pub struct TransferCircuit {
    // --- Public Inputs ---
    pub public: Option<TransferPublicInputs>,

    // --- Private Witness ---
    pub spend: Option<SpendWitness>,
    pub recipient_secret: Option<Secret>,

    // --- Circuit config ---
    pub poseidon_config: PoseidonConfig<Fr>,
}

impl TransferCircuit {
    pub fn new(public: TransferPublicInputs, spend: SpendWitness, recipient_secret: Secret) -> Self {
        Self {
            public: Some(public),
            spend: Some(spend),
            recipient_secret: Some(recipient_secret),
            poseidon_config: default_hasher().config().clone(),
        }
    }

    /// Circuit shape without assignments, for key generation.
    pub fn blank() -> Self {
        Self {
            public: None,
            spend: None,
            recipient_secret: None,
            poseidon_config: default_hasher().config().clone(),
        }
    }
}

impl ConstraintSynthesizer<Fr> for TransferCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let public = self.public.as_ref();
        let input = |f: fn(&TransferPublicInputs) -> Fr| {
            move || public.map(f).ok_or(SynthesisError::AssignmentMissing)
        };

        let root = FpVar::new_input(cs.clone(), input(|p| p.root))?;
        let nullifier_hash = FpVar::new_input(cs.clone(), input(|p| p.nullifier_hash))?;
        let new_commitment = FpVar::new_input(cs.clone(), input(|p| p.new_commitment))?;
        let amount = FpVar::new_input(cs.clone(), input(|p| Fr::from(p.amount)))?;

        enforce_spend(
            cs.clone(),
            &self.poseidon_config,
            &amount,
            &root,
            &nullifier_hash,
            self.spend.as_ref(),
        )?;

        let recipient_secret = FpVar::new_witness(cs.clone(), || {
            self.recipient_secret
                .as_ref()
                .map(Secret::to_field)
                .ok_or(SynthesisError::AssignmentMissing)
        })?;
        let computed = hash2(cs, &self.poseidon_config, &amount, &recipient_secret)?;
        computed.enforce_equal(&new_commitment)
    }
}
