//! Error classification shared by every layer.
//!
//! Each module owns its own `thiserror` enum; this module only defines the
//! taxonomy they map into and how callers should react to it.

use std::fmt;

use serde::{Deserialize, Serialize};
use whalevault_privacy::PrivacyError;
use whalevault_prover::ProverError;

/// How a caller should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed input. Fails before any work starts; never retried.
    Validation,
    /// Cryptographic or protocol rejection. Terminal.
    Protocol,
    /// Infrastructure hiccup. Retried with backoff up to a bound.
    Transient,
    /// Needs the key holder to act again. Never retried automatically.
    Interactive,
}

impl ErrorCategory {
    pub fn is_retryable(self) -> bool {
        self == ErrorCategory::Transient
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Interactive => "interactive",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every error that can reach a caller.
pub trait Classify {
    fn category(&self) -> ErrorCategory;

    /// Stable SCREAMING_SNAKE identifier
    fn code(&self) -> &str;
}

impl Classify for PrivacyError {
    fn category(&self) -> ErrorCategory {
        match self {
            PrivacyError::TreeFull { .. } => ErrorCategory::Protocol,
            _ => ErrorCategory::Validation,
        }
    }

    fn code(&self) -> &str {
        match self {
            PrivacyError::NonPositiveAmount => "INVALID_AMOUNT",
            PrivacyError::InvalidLength { .. } => "INVALID_LENGTH",
            PrivacyError::InvalidHex { .. } => "INVALID_HEX",
            PrivacyError::NonCanonical { .. } => "NON_CANONICAL_FIELD",
            PrivacyError::PathLength { .. } => "INVALID_PATH",
            PrivacyError::TreeFull { .. } => "TREE_FULL",
            PrivacyError::PayloadMissing(_) | PrivacyError::PayloadAmount(_) => "INVALID_PAYLOAD",
        }
    }
}

impl Classify for ProverError {
    fn category(&self) -> ErrorCategory {
        match self {
            ProverError::Witness(e) => e.category(),
            _ => ErrorCategory::Protocol,
        }
    }

    fn code(&self) -> &str {
        ProverError::code(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ErrorCategory::Transient.is_retryable());
        for category in [
            ErrorCategory::Validation,
            ErrorCategory::Protocol,
            ErrorCategory::Interactive,
        ] {
            assert!(!category.is_retryable(), "{category} must not be retried");
        }
    }

    #[test]
    fn test_privacy_errors_are_validation() {
        let err = PrivacyError::InvalidHex { field: "secret" };
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(Classify::code(&err), "INVALID_HEX");

        let full = PrivacyError::TreeFull { capacity: 1024 };
        assert_eq!(full.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn test_prover_witness_error_delegates() {
        let err = ProverError::Witness(PrivacyError::NonPositiveAmount);
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(ProverError::RootMismatch.category(), ErrorCategory::Protocol);
    }
}
