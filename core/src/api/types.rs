//! API Types
//!
//! Request/response bodies for the HTTP API. Shared with [`crate::client`].
//! All JSON is camelCase.

use serde::{Deserialize, Serialize};

use crate::jobs::JobId;

// ============================================================================
// Health & Pool
// ============================================================================

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: String,
    pub uptime_secs: u64,
    pub relayer_enabled: bool,
}

// ============================================================================
// Commitments & Shielding
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeCommitmentRequest {
    pub amount: u64,
    /// 64 hex characters
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeCommitmentResponse {
    pub commitment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldPrepareRequest {
    pub amount: u64,
    pub commitment: String,
    #[serde(default)]
    pub denomination: Option<u64>,
}

/// Unsigned `deposit` instruction data for the wallet to submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShieldPrepareResponse {
    /// Base64
    pub instruction_data: String,
    pub commitment: String,
    pub amount: u64,
}

/// Dev mode only: append a commitment to the in-memory pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevShieldRequest {
    pub commitment: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevShieldResponse {
    pub commitment: String,
    pub leaf_index: u64,
    pub root: String,
}

// ============================================================================
// Relay & Confirmation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub job_id: JobId,
    pub recipient: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    pub signature: String,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullifierStatusResponse {
    pub nullifier: String,
    pub spent: bool,
}

// ============================================================================
// Error Response
// ============================================================================

/// Standard error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(msg, "BAD_REQUEST")
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(msg, "NOT_FOUND")
    }
}
