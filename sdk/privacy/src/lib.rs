//! WhaleVault Privacy SDK
//!
//! Commitment/nullifier primitives for the shielded pool.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                       Shielded Pool                            │
//! │                                                                │
//! │   shield:    C = H(amount, secret)  ──►  Merkle leaf           │
//! │                                                                │
//! │   spend:     N = H(C, secret)       ──►  nullifier registry    │
//! │              proof: C ∈ tree(root) ∧ N derived from C          │
//! │                                                                │
//! │   transfer:  C' = H(amount, secret')  ──►  new leaf            │
//! │              (secret', C', amount) handed to the recipient     │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod nullifier;
pub mod payload;
pub mod secret;

pub use commitment::{Commitment, CommitmentScheme, commitment, nullifier};
pub use error::PrivacyError;
pub use hash::{Field, FieldHasher, PoseidonHasher, default_hasher, field_from_bytes, field_to_bytes};
pub use merkle::{MerklePath, MerkleTree, ROOT_HISTORY_SIZE, RootHistory, TREE_DEPTH, fold_path};
pub use nullifier::Nullifier;
pub use payload::{TransferPayload, format_sol};
pub use secret::Secret;
