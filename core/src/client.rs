//! HTTP client for a remote proof service.
//!
//! [`HttpBackend`] speaks the routes in [`crate::api`] and implements
//! [`TransferBackend`], so a wallet can drive [`crate::transfer::PrivateTransfer`]
//! against a server it does not run itself.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use whalevault_privacy::{Commitment, Nullifier, Secret};

use crate::api::types::{
    ComputeCommitmentRequest, ComputeCommitmentResponse, ConfirmationResponse, DevShieldRequest,
    DevShieldResponse, ErrorResponse, HealthResponse, NullifierStatusResponse, RelayRequest,
    ShieldPrepareRequest, ShieldPrepareResponse,
};
use crate::error::ErrorCategory;
use crate::jobs::{JobId, JobSnapshot, JobTicket, RelayerInfo, SpendRequest, TransferReceipt, WithdrawReceipt};
use crate::ledger::{PoolStats, TxSignature};
use crate::transfer::{BackendError, TransferBackend};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::new(ErrorCategory::Protocol, "HTTP_CLIENT", e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse, BackendError> {
        self.get("/api/health").await
    }

    pub async fn pool_status(&self) -> Result<PoolStats, BackendError> {
        self.get("/api/pool/status").await
    }

    pub async fn relay_info(&self) -> Result<RelayerInfo, BackendError> {
        self.get("/api/relay/info").await
    }

    pub async fn compute_commitment(
        &self,
        amount: u64,
        secret: &Secret,
    ) -> Result<Commitment, BackendError> {
        let response: ComputeCommitmentResponse = self
            .post(
                "/api/commitment/compute",
                &ComputeCommitmentRequest {
                    amount,
                    secret: secret.to_hex(),
                },
            )
            .await?;
        Commitment::from_hex(&response.commitment).map_err(invalid_response)
    }

    pub async fn prepare_shield(
        &self,
        amount: u64,
        commitment: &Commitment,
        denomination: Option<u64>,
    ) -> Result<ShieldPrepareResponse, BackendError> {
        self.post(
            "/api/shield/prepare",
            &ShieldPrepareRequest {
                amount,
                commitment: commitment.to_hex(),
                denomination,
            },
        )
        .await
    }

    /// Only served when the server runs in dev mode.
    pub async fn dev_shield(
        &self,
        commitment: &Commitment,
        amount: u64,
    ) -> Result<DevShieldResponse, BackendError> {
        self.post(
            "/api/dev/shield",
            &DevShieldRequest {
                commitment: commitment.to_hex(),
                amount,
            },
        )
        .await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await.map_err(unavailable)?;
        decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(unavailable)?;
        decode(response).await
    }
}

impl TransferBackend for HttpBackend {
    async fn request_withdraw_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        self.post("/api/unshield/proof", request).await
    }

    async fn request_transfer_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        self.post("/api/transfer/proof", request).await
    }

    async fn job_status(&self, id: &JobId) -> Result<JobSnapshot, BackendError> {
        self.get(&format!("/api/proof/status/{id}")).await
    }

    async fn relay_withdraw(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<WithdrawReceipt, BackendError> {
        self.post(
            "/api/relay/unshield",
            &RelayRequest {
                job_id: *id,
                recipient: recipient.to_string(),
            },
        )
        .await
    }

    async fn relay_transfer(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<TransferReceipt, BackendError> {
        self.post(
            "/api/relay/transfer",
            &RelayRequest {
                job_id: *id,
                recipient: recipient.to_string(),
            },
        )
        .await
    }

    async fn is_confirmed(&self, signature: &TxSignature) -> Result<bool, BackendError> {
        let response: ConfirmationResponse = self.get(&format!("/api/tx/{signature}")).await?;
        Ok(response.confirmed)
    }

    async fn nullifier_spent(&self, nullifier: &Nullifier) -> Result<bool, BackendError> {
        let response: NullifierStatusResponse = self
            .get(&format!("/api/nullifier/{}", nullifier.to_hex()))
            .await?;
        Ok(response.spent)
    }
}

/// Category a server status code stands for.
fn status_category(status: StatusCode) -> ErrorCategory {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => ErrorCategory::Validation,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::SERVICE_UNAVAILABLE => {
            ErrorCategory::Protocol
        }
        s if s.is_server_error() => ErrorCategory::Transient,
        _ => ErrorCategory::Protocol,
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(invalid_response);
    }

    let category = status_category(status);
    let body = response.text().await.unwrap_or_default();
    Err(match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(error) => BackendError::new(category, error.code, error.error),
        Err(_) => BackendError::new(category, format!("HTTP_{}", status.as_u16()), body),
    })
}

fn unavailable(e: reqwest::Error) -> BackendError {
    BackendError::new(ErrorCategory::Transient, "HTTP_UNAVAILABLE", e.to_string())
}

fn invalid_response(e: impl std::fmt::Display) -> BackendError {
    BackendError::new(ErrorCategory::Protocol, "INVALID_RESPONSE", e.to_string())
}
