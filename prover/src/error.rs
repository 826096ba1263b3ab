use thiserror::Error;
use whalevault_privacy::PrivacyError;

use crate::prover::ProofKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProverError {
    #[error("witness does not satisfy the {kind} circuit: {detail}")]
    ConstraintViolation { kind: ProofKind, detail: String },

    #[error("constraint synthesis failed: {0}")]
    Synthesis(String),

    #[error("proof generation failed: {0}")]
    Proving(String),

    #[error("merkle path does not lead to the claimed root")]
    RootMismatch,

    #[error("proof failed verification")]
    VerificationFailed,

    #[error("invalid proof encoding: {0}")]
    InvalidProof(String),

    #[error("key material error: {0}")]
    Keys(String),

    #[error("invalid witness: {0}")]
    Witness(#[from] PrivacyError),
}

impl ProverError {
    /// Stable code reported in failed proof jobs.
    pub fn code(&self) -> &'static str {
        match self {
            ProverError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            ProverError::Synthesis(_) => "SYNTHESIS_ERROR",
            ProverError::Proving(_) => "PROOF_GENERATION_FAILED",
            ProverError::RootMismatch => "ROOT_MISMATCH",
            ProverError::VerificationFailed => "PROOF_VERIFICATION_FAILED",
            ProverError::InvalidProof(_) => "INVALID_PROOF",
            ProverError::Keys(_) => "PROVER_KEYS",
            ProverError::Witness(_) => "INVALID_WITNESS",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProverError>;
