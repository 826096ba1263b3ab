//! Ledger Gateway
//!
//! The on-chain pool program stores the root history and nullifier markers
//! and moves funds atomically. This module is the only way the rest of the
//! crate talks to it.

pub mod instruction;
pub mod memory;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use whalevault_privacy::{Commitment, Field, MerklePath, Nullifier, PrivacyError};
use whalevault_prover::ProofOutput;

use crate::error::{Classify, ErrorCategory};

pub use memory::InMemoryLedger;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("commitment {0} is not in the pool")]
    CommitmentNotFound(Commitment),

    #[error("nullifier {0} has already been spent")]
    NullifierSpent(Nullifier),

    #[error("proof root is not in the recent root history")]
    UnknownRoot,

    #[error("proof rejected by the verifier: {0}")]
    InvalidProof(String),

    #[error("pool holds {available} lamports, {requested} requested")]
    InsufficientFunds { available: u64, requested: u64 },

    #[error(transparent)]
    Privacy(#[from] PrivacyError),
}

impl Classify for LedgerError {
    fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::Unavailable(_) => ErrorCategory::Transient,
            LedgerError::Privacy(e) => e.category(),
            _ => ErrorCategory::Protocol,
        }
    }

    fn code(&self) -> &str {
        match self {
            LedgerError::Unavailable(_) => "LEDGER_UNAVAILABLE",
            LedgerError::CommitmentNotFound(_) => "COMMITMENT_NOT_FOUND",
            LedgerError::NullifierSpent(_) => "NULLIFIER_SPENT",
            LedgerError::UnknownRoot => "UNKNOWN_ROOT",
            LedgerError::InvalidProof(_) => "INVALID_PROOF",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_POOL_FUNDS",
            LedgerError::Privacy(e) => e.code(),
        }
    }
}

/// Base58 transaction signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxSignature(pub String);

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Root plus authentication path for one commitment.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipWitness {
    pub root: Field,
    pub path: MerklePath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total_value_locked: u64,
    pub total_deposits: u64,
    pub anonymity_set_size: u64,
}

/// A spend submitted by the relayer.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayInstruction {
    Withdraw {
        proof: ProofOutput,
        nullifier: Nullifier,
        recipient: [u8; 32],
        amount: u64,
        fee: u64,
    },
    Transfer {
        proof: ProofOutput,
        nullifier: Nullifier,
        new_commitment: Commitment,
        amount: u64,
    },
}

impl RelayInstruction {
    pub fn proof(&self) -> &ProofOutput {
        match self {
            RelayInstruction::Withdraw { proof, .. } | RelayInstruction::Transfer { proof, .. } => {
                proof
            }
        }
    }

    pub fn nullifier(&self) -> &Nullifier {
        match self {
            RelayInstruction::Withdraw { nullifier, .. }
            | RelayInstruction::Transfer { nullifier, .. } => nullifier,
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            RelayInstruction::Withdraw { amount, .. }
            | RelayInstruction::Transfer { amount, .. } => *amount,
        }
    }

    /// Serialized instruction data for the pool program
    pub fn data(&self) -> Vec<u8> {
        match self {
            RelayInstruction::Withdraw {
                proof, amount, fee, ..
            } => instruction::withdraw_data(proof, *amount, *fee),
            RelayInstruction::Transfer { proof, amount, .. } => {
                instruction::transfer_data(proof, *amount)
            }
        }
    }
}

/// Read and write access to the pool program.
pub trait LedgerGateway: Send + Sync + 'static {
    fn membership_witness(
        &self,
        commitment: &Commitment,
    ) -> impl Future<Output = Result<MembershipWitness, LedgerError>> + Send;

    fn is_spent(&self, nullifier: &Nullifier)
    -> impl Future<Output = Result<bool, LedgerError>> + Send;

    /// Submit through the relayer; returns once the transaction is sent.
    fn submit(
        &self,
        instruction: RelayInstruction,
    ) -> impl Future<Output = Result<TxSignature, LedgerError>> + Send;

    fn is_confirmed(
        &self,
        signature: &TxSignature,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;

    fn pool_stats(&self) -> impl Future<Output = Result<PoolStats, LedgerError>> + Send;
}
