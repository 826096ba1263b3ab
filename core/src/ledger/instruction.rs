//! Instruction data for the on-chain pool program.
//!
//! Layout: 8-byte discriminator `sha256("global:<name>")[..8]`, then fields
//! as raw bytes. Amounts are little-endian u64.

use sha2::{Digest, Sha256};
use whalevault_privacy::Commitment;
use whalevault_prover::ProofOutput;

pub const SHIELD: &str = "deposit";
pub const WITHDRAW: &str = "withdraw";
pub const TRANSFER: &str = "private_transfer";

pub fn discriminator(name: &str) -> [u8; 8] {
    let hash = Sha256::digest(format!("global:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}

/// `deposit(commitment, amount)`
pub fn shield_data(commitment: &Commitment, amount: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + 32 + 8);
    data.extend_from_slice(&discriminator(SHIELD));
    data.extend_from_slice(commitment.as_bytes());
    data.extend_from_slice(&amount.to_le_bytes());
    data
}

fn with_proof(name: &str, proof: &ProofOutput) -> Vec<u8> {
    let mut data = Vec::with_capacity(8 + proof.proof.len() + 32 * proof.public_inputs.len() + 16);
    data.extend_from_slice(&discriminator(name));
    data.extend_from_slice(&proof.proof);
    // root, nullifier hash, recipient | new commitment; amount goes LE below
    for input in proof.public_inputs.iter().take(3) {
        data.extend_from_slice(input);
    }
    data
}

/// `withdraw(proof, root, nullifier_hash, recipient, amount, fee)`
pub fn withdraw_data(proof: &ProofOutput, amount: u64, fee: u64) -> Vec<u8> {
    let mut data = with_proof(WITHDRAW, proof);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&fee.to_le_bytes());
    data
}

/// `private_transfer(proof, root, nullifier_hash, new_commitment, amount)`
pub fn transfer_data(proof: &ProofOutput, amount: u64) -> Vec<u8> {
    let mut data = with_proof(TRANSFER, proof);
    data.extend_from_slice(&amount.to_le_bytes());
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use whalevault_prover::ProofKind;

    #[test]
    fn test_discriminator_is_anchor_style() {
        let expected = Sha256::digest(b"global:deposit");
        assert_eq!(discriminator(SHIELD), expected[..8]);
        assert_ne!(discriminator(WITHDRAW), discriminator(TRANSFER));
    }

    #[test]
    fn test_shield_layout() {
        let commitment = Commitment([0xab; 32]);
        let data = shield_data(&commitment, 1_000_000_000);
        assert_eq!(data.len(), 48);
        assert_eq!(&data[8..40], &[0xab; 32]);
        assert_eq!(&data[40..], &1_000_000_000u64.to_le_bytes());
    }

    #[test]
    fn test_withdraw_layout() {
        let proof = ProofOutput {
            kind: ProofKind::Withdraw,
            proof: vec![1u8; 256],
            public_inputs: vec![[2u8; 32], [3u8; 32], [4u8; 32], [5u8; 32]],
            proving_time_ms: 0,
        };
        let data = withdraw_data(&proof, 500, 1);
        assert_eq!(data.len(), 8 + 256 + 96 + 16);
        assert_eq!(&data[8 + 256..8 + 256 + 32], &[2u8; 32], "root follows the proof");
        assert_eq!(&data[data.len() - 16..data.len() - 8], &500u64.to_le_bytes());
        assert_eq!(&data[data.len() - 8..], &1u64.to_le_bytes());
    }
}
