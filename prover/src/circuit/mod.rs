pub mod hash;
pub mod merkle;
pub mod spend;
pub mod transfer;
pub mod withdraw;

pub use merkle::MerkleChecker;
pub use transfer::TransferCircuit;
pub use withdraw::WithdrawCircuit;
