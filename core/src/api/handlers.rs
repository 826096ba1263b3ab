//! API Handlers
//!
//! Request handlers for the WhaleVault proof service.

use std::time::Instant;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{info, warn};
use whalevault_privacy::{Commitment, CommitmentScheme, Nullifier, PrivacyError, Secret, field_to_bytes};

use super::types::*;
use crate::error::{Classify, ErrorCategory};
use crate::jobs::{
    JobId, JobSnapshot, JobTicket, OrchestratorError, ProofOrchestrator, RelayerInfo, SpendRequest,
    TransferReceipt, ValidationError, WithdrawReceipt,
};
use crate::ledger::{InMemoryLedger, LedgerError, LedgerGateway, PoolStats, TxSignature, instruction};

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: ProofOrchestrator<InMemoryLedger>,
    pub scheme: CommitmentScheme,
    pub dev_mode: bool,
    pub start_time: Instant,
}

impl ApiState {
    pub fn new(orchestrator: ProofOrchestrator<InMemoryLedger>, dev_mode: bool) -> Self {
        Self {
            orchestrator,
            scheme: CommitmentScheme::new(),
            dev_mode,
            start_time: Instant::now(),
        }
    }

    fn ledger(&self) -> &InMemoryLedger {
        self.orchestrator.ledger()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// A classified failure rendered as `{error, code}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, body: ErrorResponse) -> Self {
        Self { status, body }
    }

    /// Status from the error category alone.
    pub fn classified<E: Classify + std::fmt::Display>(e: &E) -> Self {
        let status = match e.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::Protocol | ErrorCategory::Interactive => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Transient => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, ErrorResponse::new(e.to_string(), e.code()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        let status = match &e {
            OrchestratorError::JobNotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::JobNotReady { .. } | OrchestratorError::AlreadyRelayed(_) => {
                StatusCode::CONFLICT
            }
            OrchestratorError::RelayerDisabled | OrchestratorError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => return Self::classified(&e),
        };
        Self::new(status, ErrorResponse::new(e.to_string(), e.code()))
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self::classified(&e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::classified(&e)
    }
}

impl From<PrivacyError> for ApiError {
    fn from(e: PrivacyError) -> Self {
        Self::classified(&e)
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Health & Pool
// ============================================================================

pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        relayer_enabled: state.orchestrator.relayer_info().enabled,
    })
}

pub async fn pool_status(State(state): State<ApiState>) -> ApiResult<PoolStats> {
    Ok(Json(state.orchestrator.pool_stats().await?))
}

// ============================================================================
// Commitments & Shielding
// ============================================================================

pub async fn compute_commitment(
    State(state): State<ApiState>,
    Json(req): Json<ComputeCommitmentRequest>,
) -> ApiResult<ComputeCommitmentResponse> {
    state.orchestrator.config().rules.check(req.amount, None)?;
    let secret = Secret::from_hex(&req.secret)?;
    let commitment = state.scheme.commit(req.amount, &secret)?;
    Ok(Json(ComputeCommitmentResponse {
        commitment: commitment.to_hex(),
    }))
}

pub async fn prepare_shield(
    State(state): State<ApiState>,
    Json(req): Json<ShieldPrepareRequest>,
) -> ApiResult<ShieldPrepareResponse> {
    state
        .orchestrator
        .config()
        .rules
        .check(req.amount, req.denomination)?;
    let commitment = Commitment::from_hex(&req.commitment)?;

    Ok(Json(ShieldPrepareResponse {
        instruction_data: BASE64.encode(instruction::shield_data(&commitment, req.amount)),
        commitment: commitment.to_hex(),
        amount: req.amount,
    }))
}

pub async fn dev_shield(
    State(state): State<ApiState>,
    Json(req): Json<DevShieldRequest>,
) -> ApiResult<DevShieldResponse> {
    let commitment = Commitment::from_hex(&req.commitment)?;
    if req.amount == 0 {
        return Err(PrivacyError::NonPositiveAmount.into());
    }
    let leaf_index = state.ledger().deposit(&commitment, req.amount)?;

    Ok(Json(DevShieldResponse {
        commitment: commitment.to_hex(),
        leaf_index,
        root: hex::encode(field_to_bytes(state.ledger().root())),
    }))
}

// ============================================================================
// Proof Jobs
// ============================================================================

pub async fn request_unshield_proof(
    State(state): State<ApiState>,
    Json(req): Json<SpendRequest>,
) -> ApiResult<JobTicket> {
    Ok(Json(state.orchestrator.submit_withdraw(&req)?))
}

pub async fn request_transfer_proof(
    State(state): State<ApiState>,
    Json(req): Json<SpendRequest>,
) -> ApiResult<JobTicket> {
    Ok(Json(state.orchestrator.submit_transfer(&req)?))
}

pub async fn proof_status(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> ApiResult<JobSnapshot> {
    let id: JobId = job_id.parse().map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorResponse::bad_request(format!("invalid job id: {job_id}")),
        )
    })?;
    Ok(Json(state.orchestrator.status(&id)?))
}

// ============================================================================
// Relayer
// ============================================================================

pub async fn relay_unshield(
    State(state): State<ApiState>,
    Json(req): Json<RelayRequest>,
) -> ApiResult<WithdrawReceipt> {
    match state.orchestrator.relay_withdraw(&req.job_id, &req.recipient).await {
        Ok(receipt) => {
            info!(job_id = %req.job_id, signature = %receipt.signature, fee = receipt.fee, "unshield relayed");
            Ok(Json(receipt))
        }
        Err(e) => {
            warn!(job_id = %req.job_id, code = e.code(), "unshield relay rejected");
            Err(e.into())
        }
    }
}

pub async fn relay_transfer(
    State(state): State<ApiState>,
    Json(req): Json<RelayRequest>,
) -> ApiResult<TransferReceipt> {
    match state.orchestrator.relay_transfer(&req.job_id, &req.recipient).await {
        Ok(receipt) => {
            info!(job_id = %req.job_id, signature = %receipt.signature, "transfer relayed");
            Ok(Json(receipt))
        }
        Err(e) => {
            warn!(job_id = %req.job_id, code = e.code(), "transfer relay rejected");
            Err(e.into())
        }
    }
}

pub async fn relay_info(State(state): State<ApiState>) -> impl IntoResponse {
    Json::<RelayerInfo>(state.orchestrator.relayer_info())
}

// ============================================================================
// Confirmation
// ============================================================================

pub async fn tx_status(
    State(state): State<ApiState>,
    Path(signature): Path<String>,
) -> ApiResult<ConfirmationResponse> {
    let confirmed = state
        .ledger()
        .is_confirmed(&TxSignature(signature.clone()))
        .await?;
    Ok(Json(ConfirmationResponse {
        signature,
        confirmed,
    }))
}

pub async fn nullifier_status(
    State(state): State<ApiState>,
    Path(nullifier): Path<String>,
) -> ApiResult<NullifierStatusResponse> {
    let parsed = Nullifier::from_hex(&nullifier)?;
    let spent = state.ledger().is_spent(&parsed).await?;
    Ok(Json(NullifierStatusResponse {
        nullifier: parsed.to_hex(),
        spent,
    }))
}
