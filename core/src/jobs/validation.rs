//! Synchronous request checks. Everything here runs before a job exists.

use thiserror::Error;
use whalevault_config::PoolConfig;
use whalevault_privacy::PrivacyError;

use crate::error::{Classify, ErrorCategory};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("amount {amount} is at or below the minimum of {min}")]
    AmountTooSmall { amount: u64, min: u64 },

    #[error("amount {amount} exceeds the maximum of {max}")]
    AmountTooLarge { amount: u64, max: u64 },

    #[error("{0} is not a supported denomination")]
    UnsupportedDenomination(u64),

    #[error("amount {amount} does not match denomination {denomination}")]
    DenominationMismatch { amount: u64, denomination: u64 },

    #[error("recipient is not a valid address: {0}")]
    InvalidRecipient(String),

    #[error("commitment does not match amount and secret")]
    CommitmentMismatch,

    #[error(transparent)]
    Field(#[from] PrivacyError),
}

impl Classify for ValidationError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }

    fn code(&self) -> &str {
        match self {
            ValidationError::AmountTooSmall { .. } | ValidationError::AmountTooLarge { .. } => {
                "INVALID_AMOUNT"
            }
            ValidationError::UnsupportedDenomination(_) => "INVALID_DENOMINATION",
            ValidationError::DenominationMismatch { .. } => "DENOMINATION_MISMATCH",
            ValidationError::InvalidRecipient(_) => "INVALID_RECIPIENT",
            ValidationError::CommitmentMismatch => "COMMITMENT_MISMATCH",
            ValidationError::Field(e) => e.code(),
        }
    }
}

/// Pool amount bounds: `min_amount < amount <= max_amount`.
#[derive(Debug, Clone, PartialEq)]
pub struct AmountRules {
    pub min_amount: u64,
    pub max_amount: u64,
    pub denominations: Vec<u64>,
}

impl Default for AmountRules {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}

impl AmountRules {
    pub fn from_config(pool: &PoolConfig) -> Self {
        Self {
            min_amount: pool.min_amount,
            max_amount: pool.max_amount,
            denominations: pool.denominations.clone(),
        }
    }

    /// `denomination` of `None` or `0` means a custom amount.
    pub fn check(&self, amount: u64, denomination: Option<u64>) -> Result<(), ValidationError> {
        if amount == 0 {
            return Err(PrivacyError::NonPositiveAmount.into());
        }
        if amount <= self.min_amount {
            return Err(ValidationError::AmountTooSmall {
                amount,
                min: self.min_amount,
            });
        }
        if amount > self.max_amount {
            return Err(ValidationError::AmountTooLarge {
                amount,
                max: self.max_amount,
            });
        }

        match denomination {
            None | Some(0) => Ok(()),
            Some(d) if !self.denominations.contains(&d) => {
                Err(ValidationError::UnsupportedDenomination(d))
            }
            Some(d) if d != amount => Err(ValidationError::DenominationMismatch {
                amount,
                denomination: d,
            }),
            Some(_) => Ok(()),
        }
    }
}

/// Parse a base58 ledger address into its 32 raw bytes.
pub fn parse_recipient(address: &str) -> Result<[u8; 32], ValidationError> {
    if !(32..=44).contains(&address.len()) {
        return Err(ValidationError::InvalidRecipient(format!(
            "expected 32-44 characters, got {}",
            address.len()
        )));
    }
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| ValidationError::InvalidRecipient(e.to_string()))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        ValidationError::InvalidRecipient(format!("decodes to {} bytes, expected 32", bytes.len()))
    })
}
