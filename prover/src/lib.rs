pub mod circuit;
pub mod constants;
pub mod error;
pub mod prover;
pub mod witness;

// Re-export key types for external usage
pub use circuit::{MerkleChecker, TransferCircuit, WithdrawCircuit};
pub use error::ProverError;
pub use prover::{
    CircuitKeys, Groth16Prover, MembershipProver, MockProver, NoProgress, ProgressSink,
    ProofKind, ProofOutput, ProofRequest, ProofStage, proof_from_bytes, proof_to_bytes,
};
pub use witness::{SpendStatement, SpendWitness, TransferPublicInputs, WithdrawPublicInputs};
