//! Withdraw Circuit
//!
//! Proves the caller may release `amount` from the pool to `recipient`.
//!
//! ```text
//! Public Inputs (in order):
//!   - root:           Merkle root the commitment is proven against
//!   - nullifier_hash: H(commitment, secret)
//!   - recipient:      Destination address, reduced into the field
//!   - amount:         Released amount in lamports
//!
//! Private Witness:
//!   - secret
//!   - path_elements[TREE_DEPTH]
//!   - path_indices[TREE_DEPTH]
//! ```
//!
//! `recipient` takes part in no constraint; the Groth16 verification
//! equation binds it to the proof.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::PoseidonConfig;
use ark_r1cs_std::{fields::fp::FpVar, prelude::*};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use whalevault_privacy::{default_hasher, field_from_bytes};

use crate::circuit::spend::enforce_spend;
use crate::witness::{SpendWitness, WithdrawPublicInputs};

#[derive(Clone)]
pub struct WithdrawCircuit {
    // --- Public Inputs ---
    pub public: Option<WithdrawPublicInputs>,

    // --- Private Witness ---
    pub spend: Option<SpendWitness>,

    // --- Circuit config ---
    pub poseidon_config: PoseidonConfig<Fr>,
}

impl WithdrawCircuit {
    pub fn new(public: WithdrawPublicInputs, spend: SpendWitness) -> Self {
        Self {
            public: Some(public),
            spend: Some(spend),
            poseidon_config: default_hasher().config().clone(),
        }
    }

    /// Circuit shape without assignments, for key generation.
    pub fn blank() -> Self {
        Self {
            public: None,
            spend: None,
            poseidon_config: default_hasher().config().clone(),
        }
    }
}

impl ConstraintSynthesizer<Fr> for WithdrawCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let public = self.public.as_ref();
        let input = |f: fn(&WithdrawPublicInputs) -> Fr| {
            move || public.map(f).ok_or(SynthesisError::AssignmentMissing)
        };

        let root = FpVar::new_input(cs.clone(), input(|p| p.root))?;
        let nullifier_hash = FpVar::new_input(cs.clone(), input(|p| p.nullifier_hash))?;
        let _recipient = FpVar::new_input(cs.clone(), input(|p| field_from_bytes(&p.recipient)))?;
        let amount = FpVar::new_input(cs.clone(), input(|p| Fr::from(p.amount)))?;

        enforce_spend(
            cs,
            &self.poseidon_config,
            &amount,
            &root,
            &nullifier_hash,
            self.spend.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_relations::r1cs::ConstraintSystem;
    use whalevault_privacy::{MerkleTree, Secret, commitment, nullifier};

    use crate::constants::NUM_PUBLIC_INPUTS;

    fn setup(amount: u64, secret: &Secret) -> (WithdrawPublicInputs, SpendWitness) {
        let mut tree = MerkleTree::new();
        tree.insert(&commitment(7_000_000, &Secret::from_bytes([9; 32])).unwrap())
            .unwrap();
        let c = commitment(amount, secret).unwrap();
        let index = tree.insert(&c).unwrap();
        let path = tree.path(index).unwrap();

        let public = WithdrawPublicInputs {
            root: tree.root(),
            nullifier_hash: nullifier(&c, secret).to_field(),
            recipient: [7u8; 32],
            amount,
        };
        (public, SpendWitness::new(secret.clone(), &path).unwrap())
    }

    fn satisfied(circuit: WithdrawCircuit) -> bool {
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn test_valid_withdraw_satisfied() {
        let secret = Secret::from_bytes([0x42; 32]);
        let (public, spend) = setup(1_000_000_000, &secret);

        let cs = ConstraintSystem::<Fr>::new_ref();
        WithdrawCircuit::new(public, spend)
            .generate_constraints(cs.clone())
            .unwrap();
        assert!(cs.is_satisfied().unwrap());
        // instance variables include the constant one
        assert_eq!(cs.num_instance_variables(), NUM_PUBLIC_INPUTS + 1);
    }

    #[test]
    fn test_wrong_amount_unsatisfied() {
        let secret = Secret::from_bytes([0x42; 32]);
        let (mut public, spend) = setup(1_000_000_000, &secret);
        public.amount = 2_000_000_000;
        assert!(!satisfied(WithdrawCircuit::new(public, spend)));
    }

    #[test]
    fn test_wrong_nullifier_unsatisfied() {
        let secret = Secret::from_bytes([0x42; 32]);
        let (mut public, spend) = setup(1_000_000_000, &secret);
        public.nullifier_hash += Fr::from(1u64);
        assert!(!satisfied(WithdrawCircuit::new(public, spend)));
    }

    #[test]
    fn test_wrong_secret_unsatisfied() {
        let secret = Secret::from_bytes([0x42; 32]);
        let (public, mut spend) = setup(1_000_000_000, &secret);
        spend.secret = Secret::from_bytes([0x43; 32]);
        assert!(!satisfied(WithdrawCircuit::new(public, spend)));
    }

    #[test]
    fn test_recipient_does_not_affect_satisfiability() {
        let secret = Secret::from_bytes([0x42; 32]);
        let (mut public, spend) = setup(1_000_000_000, &secret);
        public.recipient = [0xee; 32];
        assert!(satisfied(WithdrawCircuit::new(public, spend)));
    }
}
