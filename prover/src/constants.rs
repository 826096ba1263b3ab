pub use whalevault_privacy::TREE_DEPTH;

/// Groth16 proof size in bytes: -A (64) || B (128) || C (64)
pub const PROOF_SIZE: usize = 256;

/// Size of a single public input (big-endian field element)
pub const PUBLIC_INPUT_SIZE: usize = 32;

/// Public inputs per circuit.
/// Withdraw: root, nullifierHash, recipient, amount
/// Transfer: root, nullifierHash, newCommitment, amount
pub const NUM_PUBLIC_INPUTS: usize = 4;
