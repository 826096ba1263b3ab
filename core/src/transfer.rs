//! Private Transfer Protocol
//!
//! Moves a position's value to a fresh commitment owned by somebody else, or
//! out of the pool to an address.
//!
//! ```text
//!   idle ─► deriving ─► requesting ─► generating ─► relaying ─► confirming ─► success
//!              │            │             │             │            │
//!              └────────────┴─────────────┴─────────────┴────────────┴─────► error
//! ```
//!
//! Once the relayer has submitted, the spend is out of our hands: the
//! position is marked spent even if confirmation fails afterwards, and the
//! recipient's recovery data is carried in the error. A position is claimed
//! for the whole flow, so at most one proof job exists per position.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use whalevault_config::VaultConfig;
use whalevault_privacy::{CommitmentScheme, Nullifier, PrivacyError, TransferPayload};

use crate::derivation::{DerivationError, MessageSigner, SecretDeriver};
use crate::error::{Classify, ErrorCategory};
use crate::jobs::{
    JobError, JobId, JobSnapshot, JobStatus, JobTicket, OrchestratorError, ProofOrchestrator,
    SpendRequest, TransferReceipt, WithdrawReceipt,
};
use crate::ledger::{LedgerGateway, TxSignature, instruction};
use crate::polling::{PollConfig, PollError, poll_with_backoff_cancellable};
use crate::position::{
    Position, PositionError, PositionId, PositionStatus, PositionStore, SpendGuard,
};

/// Failure reported by a [`TransferBackend`], already classified.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: String,
    pub message: String,
    pub category: ErrorCategory,
}

impl BackendError {
    pub fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            category,
        }
    }

    pub fn from_error<E: Classify + fmt::Display>(e: &E) -> Self {
        Self::new(e.category(), e.code(), e.to_string())
    }
}

impl Classify for BackendError {
    fn category(&self) -> ErrorCategory {
        self.category
    }

    fn code(&self) -> &str {
        &self.code
    }
}

impl From<OrchestratorError> for BackendError {
    fn from(e: OrchestratorError) -> Self {
        Self::from_error(&e)
    }
}

/// Proof service and relayer as seen by the client.
pub trait TransferBackend: Send + Sync + 'static {
    fn request_withdraw_proof(
        &self,
        request: &SpendRequest,
    ) -> impl Future<Output = Result<JobTicket, BackendError>> + Send;

    fn request_transfer_proof(
        &self,
        request: &SpendRequest,
    ) -> impl Future<Output = Result<JobTicket, BackendError>> + Send;

    fn job_status(&self, id: &JobId)
    -> impl Future<Output = Result<JobSnapshot, BackendError>> + Send;

    fn relay_withdraw(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> impl Future<Output = Result<WithdrawReceipt, BackendError>> + Send;

    fn relay_transfer(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> impl Future<Output = Result<TransferReceipt, BackendError>> + Send;

    fn is_confirmed(
        &self,
        signature: &TxSignature,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;

    fn nullifier_spent(
        &self,
        nullifier: &Nullifier,
    ) -> impl Future<Output = Result<bool, BackendError>> + Send;
}

/// In-process backend: the orchestrator and its ledger directly.
impl<L: LedgerGateway> TransferBackend for ProofOrchestrator<L> {
    async fn request_withdraw_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        Ok(self.submit_withdraw(request)?)
    }

    async fn request_transfer_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        Ok(self.submit_transfer(request)?)
    }

    async fn job_status(&self, id: &JobId) -> Result<JobSnapshot, BackendError> {
        Ok(self.status(id)?)
    }

    async fn relay_withdraw(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<WithdrawReceipt, BackendError> {
        Ok(ProofOrchestrator::relay_withdraw(self, id, recipient).await?)
    }

    async fn relay_transfer(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<TransferReceipt, BackendError> {
        Ok(ProofOrchestrator::relay_transfer(self, id, recipient).await?)
    }

    async fn is_confirmed(&self, signature: &TxSignature) -> Result<bool, BackendError> {
        self.ledger()
            .is_confirmed(signature)
            .await
            .map_err(|e| BackendError::from_error(&e))
    }

    async fn nullifier_spent(&self, nullifier: &Nullifier) -> Result<bool, BackendError> {
        self.ledger()
            .is_spent(nullifier)
            .await
            .map_err(|e| BackendError::from_error(&e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    Deriving,
    Requesting,
    Generating { progress: u8 },
    Relaying,
    Confirming,
    Success,
    Error,
}

pub trait PhaseObserver: Send + Sync {
    fn on_phase(&self, phase: TransferPhase);
}

impl<F: Fn(TransferPhase) + Send + Sync> PhaseObserver for F {
    fn on_phase(&self, phase: TransferPhase) {
        self(phase)
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("position {0} not found")]
    PositionNotFound(PositionId),

    #[error("position {id} is {status}")]
    PositionNotActive {
        id: PositionId,
        status: PositionStatus,
    },

    #[error("position is locked, retry in {}s", .remaining.as_secs())]
    Locked { remaining: Duration },

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error(transparent)]
    Payload(#[from] PrivacyError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("proof job failed: {} ({})", .0.message, .0.code)]
    ProofFailed(JobError),

    #[error("proof job {job_id} did not finish in time")]
    ProofTimeout {
        job_id: JobId,
        last_error: Option<BackendError>,
    },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("transaction {signature} was relayed but not confirmed: {reason}")]
    ConfirmationFailed {
        signature: TxSignature,
        nullifier: Nullifier,
        reason: String,
        /// Present for transfers; hand it to the recipient regardless.
        recovery: Option<Box<TransferPayload>>,
    },

    #[error("relay response was lost after the spend landed: {reason}")]
    ReceiptLost { nullifier: Nullifier, reason: String },
}

impl TransferError {
    /// Recipient recovery data produced before the failure, if any.
    pub fn recovery(&self) -> Option<&TransferPayload> {
        match self {
            TransferError::ConfirmationFailed { recovery, .. } => recovery.as_deref(),
            _ => None,
        }
    }
}

impl Classify for TransferError {
    fn category(&self) -> ErrorCategory {
        match self {
            TransferError::PositionNotFound(_) | TransferError::Locked { .. } => {
                ErrorCategory::Validation
            }
            TransferError::PositionNotActive { .. }
            | TransferError::ProofFailed(_)
            | TransferError::ReceiptLost { .. } => ErrorCategory::Protocol,
            TransferError::Derivation(e) => e.category(),
            TransferError::Position(e) => e.category(),
            TransferError::Payload(e) => e.category(),
            TransferError::Backend(e) => e.category(),
            TransferError::ProofTimeout { .. } | TransferError::ConfirmationFailed { .. } => {
                ErrorCategory::Transient
            }
            TransferError::Cancelled => ErrorCategory::Interactive,
        }
    }

    fn code(&self) -> &str {
        match self {
            TransferError::PositionNotFound(_) => "POSITION_NOT_FOUND",
            TransferError::PositionNotActive { .. } => "POSITION_NOT_ACTIVE",
            TransferError::Locked { .. } => "POSITION_LOCKED",
            TransferError::Derivation(e) => e.code(),
            TransferError::Position(e) => e.code(),
            TransferError::Payload(e) => e.code(),
            TransferError::Backend(e) => e.code(),
            TransferError::ProofFailed(e) => &e.code,
            TransferError::ProofTimeout { .. } => "PROOF_TIMEOUT",
            TransferError::Cancelled => "CANCELLED",
            TransferError::ConfirmationFailed { .. } => "CONFIRMATION_FAILED",
            TransferError::ReceiptLost { .. } => "RECEIPT_LOST",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub position_id: PositionId,
    pub signature: TxSignature,
    /// Deliver to the recipient out of band.
    pub payload: TransferPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnshieldOutcome {
    pub position_id: PositionId,
    pub signature: TxSignature,
    pub fee: u64,
    pub amount_sent: u64,
}

/// A new position plus the `deposit` instruction data the wallet submits.
#[derive(Debug, Clone, PartialEq)]
pub struct ShieldPlan {
    pub position: Position,
    pub instruction_data: Vec<u8>,
}

// Secret material for one spend; dropped as soon as the request is sent.
struct PreparedSpend<'a> {
    position: Position,
    request: SpendRequest,
    nullifier: Nullifier,
    claim: SpendGuard<'a>,
}

/// Client-side driver for shield, transfer, unshield and import.
pub struct PrivateTransfer<S, B> {
    deriver: SecretDeriver<S>,
    backend: Arc<B>,
    positions: Arc<PositionStore>,
    scheme: CommitmentScheme,
    job_poll: PollConfig,
    confirm_poll: PollConfig,
    observer: Option<Arc<dyn PhaseObserver>>,
}

impl<S: MessageSigner, B: TransferBackend> PrivateTransfer<S, B> {
    pub fn new(deriver: SecretDeriver<S>, backend: Arc<B>, positions: Arc<PositionStore>) -> Self {
        let polling = whalevault_config::PollingConfig::default();
        Self {
            deriver,
            backend,
            positions,
            scheme: CommitmentScheme::new(),
            job_poll: PollConfig::job_polling(&polling),
            confirm_poll: PollConfig::confirmation(&polling),
            observer: None,
        }
    }

    pub fn from_config(
        signer: S,
        backend: Arc<B>,
        positions: Arc<PositionStore>,
        config: &VaultConfig,
    ) -> Self {
        Self::new(
            SecretDeriver::from_config(signer, &config.derivation),
            backend,
            positions,
        )
        .with_polling(
            PollConfig::job_polling(&config.polling),
            PollConfig::confirmation(&config.polling),
        )
    }

    pub fn with_polling(mut self, job_poll: PollConfig, confirm_poll: PollConfig) -> Self {
        self.job_poll = job_poll;
        self.confirm_poll = confirm_poll;
        self
    }

    pub fn with_observer(mut self, observer: impl PhaseObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn positions(&self) -> &Arc<PositionStore> {
        &self.positions
    }

    fn emit(&self, phase: TransferPhase) {
        if let Some(observer) = &self.observer {
            observer.on_phase(phase);
        }
    }

    /// Create a nonce-derived position and the instruction that shields it.
    pub async fn shield(
        &self,
        amount: u64,
        denomination: Option<u64>,
    ) -> Result<ShieldPlan, TransferError> {
        let position = self
            .positions
            .shield_new(&self.deriver, amount, denomination)
            .await?;
        let instruction_data = instruction::shield_data(&position.commitment, amount);
        Ok(ShieldPlan {
            position,
            instruction_data,
        })
    }

    /// Track a transfer received as shareable text.
    pub fn import(&self, text: &str) -> Result<Position, TransferError> {
        let payload = TransferPayload::parse(text)?;
        Ok(self.positions.import(&payload)?)
    }

    /// Send a position's full amount to a new commitment for someone else.
    pub async fn transfer(
        &self,
        id: &PositionId,
        recipient: &str,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome, TransferError> {
        let result = self.run_transfer(id, recipient, cancel).await;
        self.finish(id, "transfer", &result);
        result
    }

    /// Withdraw a position to `recipient`. The position is marked unshielded
    /// only after the withdrawal is confirmed.
    pub async fn unshield(
        &self,
        id: &PositionId,
        recipient: &str,
        cancel: &CancellationToken,
    ) -> Result<UnshieldOutcome, TransferError> {
        let result = self.run_unshield(id, recipient, cancel).await;
        self.finish(id, "unshield", &result);
        result
    }

    fn finish<T>(&self, id: &PositionId, flow: &str, result: &Result<T, TransferError>) {
        match result {
            Ok(_) => {
                info!(position_id = %id, flow, "completed");
                self.emit(TransferPhase::Success);
            }
            Err(e) => {
                warn!(position_id = %id, flow, code = e.code(), error = %e, "failed");
                self.emit(TransferPhase::Error);
            }
        }
    }

    async fn run_transfer(
        &self,
        id: &PositionId,
        recipient: &str,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome, TransferError> {
        let spend = self.prepare(id, recipient, cancel).await?;

        self.emit(TransferPhase::Requesting);
        let ticket = self.backend.request_transfer_proof(&spend.request).await?;
        let PreparedSpend {
            position,
            request,
            nullifier,
            claim: _claim,
        } = spend;
        drop(request);

        self.await_proof(&ticket.job_id, cancel).await?;
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        self.emit(TransferPhase::Relaying);
        let receipt = match self.backend.relay_transfer(&ticket.job_id, recipient).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if self.spend_landed(&e, &nullifier).await {
                    self.positions.mark_transferred(&position.id)?;
                    return Err(TransferError::ReceiptLost {
                        nullifier,
                        reason: e.to_string(),
                    });
                }
                return Err(e.into());
            }
        };

        // Funds have left the position whatever happens next.
        if let Err(e) = self.positions.mark_transferred(&position.id) {
            warn!(position_id = %position.id, error = %e, "could not mark position transferred");
        }
        let payload = TransferPayload::new(
            receipt.recipient_secret,
            receipt.new_commitment,
            receipt.amount,
        );

        self.emit(TransferPhase::Confirming);
        if let Err(reason) = self.confirm(&receipt.signature, &nullifier, cancel).await {
            return Err(TransferError::ConfirmationFailed {
                signature: receipt.signature,
                nullifier,
                reason,
                recovery: Some(Box::new(payload)),
            });
        }

        Ok(TransferOutcome {
            position_id: position.id,
            signature: receipt.signature,
            payload,
        })
    }

    async fn run_unshield(
        &self,
        id: &PositionId,
        recipient: &str,
        cancel: &CancellationToken,
    ) -> Result<UnshieldOutcome, TransferError> {
        let spend = self.prepare(id, recipient, cancel).await?;

        self.emit(TransferPhase::Requesting);
        let ticket = self.backend.request_withdraw_proof(&spend.request).await?;
        let PreparedSpend {
            position,
            request,
            nullifier,
            claim: _claim,
        } = spend;
        drop(request);

        self.await_proof(&ticket.job_id, cancel).await?;
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        self.emit(TransferPhase::Relaying);
        let receipt = match self.backend.relay_withdraw(&ticket.job_id, recipient).await {
            Ok(receipt) => receipt,
            Err(e) => {
                if self.spend_landed(&e, &nullifier).await {
                    self.positions.mark_unshielded(&position.id)?;
                    return Err(TransferError::ReceiptLost {
                        nullifier,
                        reason: e.to_string(),
                    });
                }
                return Err(e.into());
            }
        };

        self.emit(TransferPhase::Confirming);
        if let Err(reason) = self.confirm(&receipt.signature, &nullifier, cancel).await {
            return Err(TransferError::ConfirmationFailed {
                signature: receipt.signature,
                nullifier,
                reason,
                recovery: None,
            });
        }
        self.positions.mark_unshielded(&position.id)?;

        Ok(UnshieldOutcome {
            position_id: position.id,
            signature: receipt.signature,
            fee: receipt.fee,
            amount_sent: receipt.amount_sent,
        })
    }

    // Checks and claims the position, then derives its secret. Signing waits
    // on the key holder, so only cancellation ends it early.
    async fn prepare(
        &self,
        id: &PositionId,
        recipient: &str,
        cancel: &CancellationToken,
    ) -> Result<PreparedSpend<'_>, TransferError> {
        let position = self
            .positions
            .get(id)
            .ok_or(TransferError::PositionNotFound(*id))?;
        if !position.is_active() {
            return Err(TransferError::PositionNotActive {
                id: *id,
                status: position.status,
            });
        }
        if let Some(remaining) = position.lock_remaining(Utc::now()) {
            return Err(TransferError::Locked { remaining });
        }
        let claim = self.positions.try_begin_spend(id)?;

        self.emit(TransferPhase::Deriving);
        let secret = tokio::select! {
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            secret = self.deriver.resolve(&position.source) => secret?,
        };

        let nullifier = self.scheme.nullifier(&position.commitment, &secret);
        let request = SpendRequest {
            commitment: position.commitment.to_hex(),
            secret: secret.to_hex(),
            amount: position.amount,
            recipient: recipient.to_string(),
            denomination: position.denomination,
        };
        Ok(PreparedSpend {
            position,
            request,
            nullifier,
            claim,
        })
    }

    async fn await_proof(
        &self,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<JobSnapshot, TransferError> {
        self.emit(TransferPhase::Generating { progress: 0 });
        let backend = &self.backend;
        let outcome = poll_with_backoff_cancellable(
            move || backend.job_status(job_id),
            |snapshot: &JobSnapshot| {
                self.emit(TransferPhase::Generating {
                    progress: snapshot.progress,
                });
                snapshot.status.is_terminal()
            },
            &self.job_poll,
            cancel,
        )
        .await;

        let snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(PollError::Cancelled) => return Err(TransferError::Cancelled),
            Err(PollError::Timeout { last_error, .. }) => {
                return Err(TransferError::ProofTimeout {
                    job_id: *job_id,
                    last_error,
                });
            }
        };

        match (snapshot.status, &snapshot.error) {
            (JobStatus::Completed, _) => Ok(snapshot),
            (_, Some(error)) => Err(TransferError::ProofFailed(error.clone())),
            (status, None) => Err(TransferError::ProofFailed(JobError::new(
                "PROOF_FAILED",
                format!("job ended as {status:?}"),
            ))),
        }
    }

    // A transient relay failure may hide a submitted transaction.
    async fn spend_landed(&self, error: &BackendError, nullifier: &Nullifier) -> bool {
        if !error.category().is_retryable() {
            return false;
        }
        match self.backend.nullifier_spent(nullifier).await {
            Ok(spent) => {
                if spent {
                    warn!(code = error.code(), "relay failed but the nullifier is spent");
                }
                spent
            }
            Err(e) => {
                warn!(error = %e, "nullifier lookup after relay failure failed");
                false
            }
        }
    }

    // Falls back to the nullifier registry when the signature never shows up.
    async fn confirm(
        &self,
        signature: &TxSignature,
        nullifier: &Nullifier,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        let backend = &self.backend;
        let outcome = poll_with_backoff_cancellable(
            move || backend.is_confirmed(signature),
            |confirmed| *confirmed,
            &self.confirm_poll,
            cancel,
        )
        .await;

        let reason = match outcome {
            Ok(_) => return Ok(()),
            Err(PollError::Cancelled) => "confirmation wait cancelled".to_string(),
            Err(PollError::Timeout { attempts, last_error }) => match last_error {
                Some(e) => format!("not confirmed after {attempts} attempts: {e}"),
                None => format!("not confirmed after {attempts} attempts"),
            },
        };

        match self.backend.nullifier_spent(nullifier).await {
            Ok(true) => {
                info!(%signature, "spend found in nullifier registry");
                Ok(())
            }
            _ => Err(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{Ed25519Signer, SecretSource, SignerError};
    use crate::ledger::InMemoryLedger;
    use crate::jobs::OrchestratorConfig;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicU32, Ordering};
    use whalevault_privacy::{Secret, commitment};
    use whalevault_prover::MockProver;

    struct Counting(AtomicU32);

    impl MessageSigner for Counting {
        async fn sign_message(&self, _message: &[u8]) -> Result<Vec<u8>, SignerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1; 64])
        }
    }

    fn client<S: MessageSigner>(signer: S) -> PrivateTransfer<S, ProofOrchestrator<InMemoryLedger>> {
        let prover = Arc::new(MockProver::with_prove_time(Duration::ZERO));
        let ledger = Arc::new(InMemoryLedger::new(prover.clone()));
        let backend = Arc::new(ProofOrchestrator::new(
            prover,
            ledger,
            OrchestratorConfig::default(),
        ));
        PrivateTransfer::new(
            SecretDeriver::new(signer, "solana:devnet", 1),
            backend,
            Arc::new(PositionStore::new()),
        )
    }

    #[tokio::test]
    async fn test_locked_position_fails_before_derivation() {
        let client = client(Counting(AtomicU32::new(0)));
        let secret = Secret::from_bytes([0x42; 32]);
        let position = Position::new(
            commitment(1_000_000_000, &secret).unwrap(),
            1_000_000_000,
            None,
            SecretSource::NonceDerived(crate::derivation::Nonce::generate()),
        )
        .with_lock_until(Utc::now() + ChronoDuration::hours(2));
        let id = client.positions().insert(position).unwrap();

        let recipient = bs58::encode([9u8; 32]).into_string();
        let err = client
            .transfer(&id, &recipient, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            TransferError::Locked { remaining } => {
                let secs = remaining.as_secs();
                assert!(secs > 7_100 && secs <= 7_200, "remaining {secs}s");
            }
            other => panic!("expected locked error, got {other:?}"),
        }
        assert_eq!(
            client.deriver.signer().0.load(Ordering::SeqCst),
            0,
            "no signature may be requested for a locked position"
        );
    }

    #[tokio::test]
    async fn test_spent_position_is_rejected() {
        let client = client(Ed25519Signer::from_seed([1; 32]));
        let secret = Secret::from_bytes([0x42; 32]);
        let text = TransferPayload::new(
            secret.clone(),
            commitment(1_000_000_000, &secret).unwrap(),
            1_000_000_000,
        )
        .to_text();
        let position = client.import(&text).unwrap();
        client.positions().mark_transferred(&position.id).unwrap();

        let err = client
            .unshield(&position.id, "anything", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "POSITION_NOT_ACTIVE");
    }

    #[tokio::test]
    async fn test_import_twice_is_rejected() {
        let client = client(Ed25519Signer::from_seed([1; 32]));
        let secret = Secret::from_bytes([7; 32]);
        let text = format!(
            "forwarded message:\n{}\n-- sent from my phone",
            TransferPayload::new(secret.clone(), commitment(5_000_000, &secret).unwrap(), 5_000_000)
        );

        client.import(&text).unwrap();
        let err = client.import(&text).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_COMMITMENT");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn test_cancel_during_signing() {
        struct Hanging;
        impl MessageSigner for Hanging {
            async fn sign_message(&self, _message: &[u8]) -> Result<Vec<u8>, SignerError> {
                std::future::pending().await
            }
        }

        let client = client(Hanging);
        let position = Position::new(
            commitment(1_000_000_000, &Secret::from_bytes([3; 32])).unwrap(),
            1_000_000_000,
            None,
            SecretSource::NonceDerived(crate::derivation::Nonce::generate()),
        );
        let id = client.positions().insert(position).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = client.transfer(&id, "anything", &cancel).await.unwrap_err();
        assert!(matches!(err, TransferError::Cancelled), "got {err:?}");
        assert_eq!(err.category(), ErrorCategory::Interactive);
        assert!(client.positions().get(&id).unwrap().is_active());
    }
}
