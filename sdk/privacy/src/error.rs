use thiserror::Error;

/// Errors raised by the commitment engine, the Merkle tree and the payload codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrivacyError {
    #[error("amount must be a positive integer")]
    NonPositiveAmount,

    #[error("{field} must be {expected} hex characters, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{field} is not valid hex")]
    InvalidHex { field: &'static str },

    #[error("{field} is not a canonical field element")]
    NonCanonical { field: &'static str },

    #[error("merkle path has {actual} levels, expected {expected}")]
    PathLength { expected: usize, actual: usize },

    #[error("merkle tree is full ({capacity} leaves)")]
    TreeFull { capacity: u64 },

    #[error("transfer payload is missing a valid {0} line")]
    PayloadMissing(&'static str),

    #[error("transfer payload amount is invalid: {0}")]
    PayloadAmount(String),
}

pub type Result<T> = std::result::Result<T, PrivacyError>;
