//! Proof Job Orchestrator
//!
//! Requests are validated synchronously, then each becomes a job handed to
//! a bounded worker pool. Workers fetch the membership witness, prove on the
//! blocking pool, and leave the job `completed` or `failed`. Finished jobs
//! stay readable for a retention window, then the sweeper drops them.
//!
//! ```text
//!   submit ──► validate ──► Pending ──► (permit) ──► Generating ──► Completed ──► relay
//!                 │                                      │
//!                 └─► ValidationError                    └─► Failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use whalevault_config::{ProverMode, VaultConfig};
use whalevault_privacy::{Commitment, CommitmentScheme, Nullifier, Secret};
use whalevault_prover::{
    MembershipProver, ProofKind, ProofOutput, ProofRequest, ProofStage, SpendStatement,
    TransferPublicInputs, WithdrawPublicInputs,
};

use super::job::{JobError, JobId, JobSnapshot, JobStatus, ProofJob, RelayState, job_err};
use super::validation::{AmountRules, ValidationError, parse_recipient};
use crate::error::{Classify, ErrorCategory};
use crate::ledger::{LedgerError, LedgerGateway, PoolStats, RelayInstruction, TxSignature};
use crate::polling::{PollConfig, PollError, poll_with_backoff_cancellable};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("proof job {0} not found")]
    JobNotFound(JobId),

    #[error("proof job {id} is {status:?}, not completed")]
    JobNotReady { id: JobId, status: JobStatus },

    #[error("proof job is a {actual} job, expected {expected}")]
    WrongKind {
        expected: ProofKind,
        actual: ProofKind,
    },

    #[error("proof job {0} has already been relayed")]
    AlreadyRelayed(JobId),

    #[error("recipient does not match the proof")]
    RecipientMismatch,

    #[error("relayer is disabled")]
    RelayerDisabled,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("relayer unavailable after {attempts} attempts: {last_error}")]
    RelayExhausted { attempts: u32, last_error: String },

    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

impl Classify for OrchestratorError {
    fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::Validation(e) => e.category(),
            OrchestratorError::JobNotFound(_)
            | OrchestratorError::JobNotReady { .. }
            | OrchestratorError::WrongKind { .. }
            | OrchestratorError::RecipientMismatch => ErrorCategory::Validation,
            OrchestratorError::AlreadyRelayed(_) | OrchestratorError::RelayerDisabled => {
                ErrorCategory::Protocol
            }
            OrchestratorError::Ledger(e) => e.category(),
            OrchestratorError::RelayExhausted { .. } | OrchestratorError::ShuttingDown => {
                ErrorCategory::Transient
            }
        }
    }

    fn code(&self) -> &str {
        match self {
            OrchestratorError::Validation(e) => e.code(),
            OrchestratorError::JobNotFound(_) => "JOB_NOT_FOUND",
            OrchestratorError::JobNotReady { .. } => "JOB_NOT_READY",
            OrchestratorError::WrongKind { .. } => "WRONG_JOB_KIND",
            OrchestratorError::AlreadyRelayed(_) => "ALREADY_RELAYED",
            OrchestratorError::RecipientMismatch => "RECIPIENT_MISMATCH",
            OrchestratorError::RelayerDisabled => "RELAYER_DISABLED",
            OrchestratorError::Ledger(e) => e.code(),
            OrchestratorError::RelayExhausted { .. } => "RELAY_UNAVAILABLE",
            OrchestratorError::ShuttingDown => "SHUTTING_DOWN",
        }
    }
}

/// Proof request as sent by clients. Hex fields are 64 characters.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendRequest {
    pub commitment: String,
    pub secret: String,
    pub amount: u64,
    pub recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denomination: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTicket {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Seconds
    pub estimated_time: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawReceipt {
    pub signature: TxSignature,
    pub fee: u64,
    pub amount_sent: u64,
    pub recipient: String,
}

/// Everything the sender must pass to the recipient is in here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub signature: TxSignature,
    pub amount: u64,
    pub recipient_secret: Secret,
    pub new_commitment: Commitment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerInfo {
    pub enabled: bool,
    pub fee_bps: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub rules: AmountRules,
    pub relayer: RelayerInfo,
    pub relay_retry: PollConfig,
    pub max_concurrent: usize,
    pub job_timeout: Duration,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub estimated_proof_time: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_config(&VaultConfig::default())
    }
}

impl OrchestratorConfig {
    pub fn from_config(config: &VaultConfig) -> Self {
        let estimated_proof_time = match config.prover.mode {
            ProverMode::Mock => Duration::from_millis(config.prover.mock_prove_time_ms),
            ProverMode::Groth16 => Duration::from_secs(15),
        };
        Self {
            rules: AmountRules::from_config(&config.pool),
            relayer: RelayerInfo {
                enabled: config.relayer.enabled,
                fee_bps: config.relayer.fee_bps,
                address: None,
            },
            relay_retry: PollConfig::new(
                Duration::from_millis(500),
                Duration::from_secs(4),
                2.0,
                5,
            ),
            max_concurrent: config.prover.max_concurrent_proofs.max(1),
            job_timeout: Duration::from_secs(config.prover.job_timeout_secs),
            retention: Duration::from_secs(config.prover.job_retention_secs),
            sweep_interval: Duration::from_secs(config.prover.sweep_interval_secs),
            estimated_proof_time,
        }
    }

    pub fn with_relayer_address(mut self, address: impl Into<String>) -> Self {
        self.relayer.address = Some(address.into());
        self
    }
}

/// Validated request. Lives only inside the worker task.
struct PendingSpend {
    id: JobId,
    kind: ProofKind,
    amount: u64,
    secret: Secret,
    recipient: [u8; 32],
    recipient_secret: Option<Secret>,
    new_commitment: Option<Commitment>,
    commitment: Commitment,
    nullifier: Nullifier,
}

/// What a relay takes out of a completed job.
struct ClaimedJob {
    output: ProofOutput,
    nullifier: Nullifier,
    amount: u64,
    new_commitment: Option<Commitment>,
    recipient_secret: Option<Secret>,
}

struct Inner<L> {
    jobs: Arc<DashMap<JobId, ProofJob>>,
    prover: Arc<dyn MembershipProver>,
    ledger: Arc<L>,
    permits: Arc<Semaphore>,
    scheme: CommitmentScheme,
    config: OrchestratorConfig,
    shutdown: CancellationToken,
}

/// Cheap to clone; all clones share one job table and worker pool.
pub struct ProofOrchestrator<L> {
    inner: Arc<Inner<L>>,
}

impl<L> Clone for ProofOrchestrator<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: LedgerGateway> ProofOrchestrator<L> {
    pub fn new(
        prover: Arc<dyn MembershipProver>,
        ledger: Arc<L>,
        config: OrchestratorConfig,
    ) -> Self {
        info!(
            prover = prover.name(),
            max_concurrent = config.max_concurrent,
            job_timeout_secs = config.job_timeout.as_secs(),
            "proof orchestrator started"
        );
        Self {
            inner: Arc::new(Inner {
                jobs: Arc::new(DashMap::new()),
                prover,
                ledger,
                permits: Arc::new(Semaphore::new(config.max_concurrent)),
                scheme: CommitmentScheme::new(),
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.inner.ledger
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn relayer_info(&self) -> RelayerInfo {
        self.inner.config.relayer.clone()
    }

    pub async fn pool_stats(&self) -> Result<PoolStats, OrchestratorError> {
        Ok(self.inner.ledger.pool_stats().await?)
    }

    /// Number of jobs currently tracked, finished ones included.
    pub fn job_count(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn submit_withdraw(&self, request: &SpendRequest) -> Result<JobTicket, OrchestratorError> {
        let spend = self.validate(request, ProofKind::Withdraw)?;
        Ok(self.enqueue(spend))
    }

    /// Also draws the recipient's secret and binds its commitment into the
    /// same proof.
    pub fn submit_transfer(&self, request: &SpendRequest) -> Result<JobTicket, OrchestratorError> {
        let spend = self.validate(request, ProofKind::Transfer)?;
        Ok(self.enqueue(spend))
    }

    fn validate(
        &self,
        request: &SpendRequest,
        kind: ProofKind,
    ) -> Result<PendingSpend, OrchestratorError> {
        let commitment = Commitment::from_hex(&request.commitment).map_err(ValidationError::from)?;
        let secret = Secret::from_hex(&request.secret).map_err(ValidationError::from)?;
        self.inner
            .config
            .rules
            .check(request.amount, request.denomination)?;
        let recipient = parse_recipient(&request.recipient)?;

        let scheme = &self.inner.scheme;
        if scheme.commit(request.amount, &secret).map_err(ValidationError::from)? != commitment {
            return Err(ValidationError::CommitmentMismatch.into());
        }
        let nullifier = scheme.nullifier(&commitment, &secret);

        let (recipient_secret, new_commitment) = match kind {
            ProofKind::Withdraw => (None, None),
            ProofKind::Transfer => {
                let recipient_secret = Secret::random();
                let new_commitment = scheme
                    .commit(request.amount, &recipient_secret)
                    .map_err(ValidationError::from)?;
                (Some(recipient_secret), Some(new_commitment))
            }
        };

        Ok(PendingSpend {
            id: JobId::new(),
            kind,
            amount: request.amount,
            secret,
            recipient,
            recipient_secret,
            new_commitment,
            commitment,
            nullifier,
        })
    }

    fn enqueue(&self, spend: PendingSpend) -> JobTicket {
        let mut job = ProofJob::new(spend.kind, spend.amount, spend.nullifier);
        job.id = spend.id;
        job.recipient = Some(spend.recipient);
        job.new_commitment = spend.new_commitment;
        job.recipient_secret = spend.recipient_secret.clone();
        let ticket = JobTicket {
            job_id: job.id,
            status: job.status,
            estimated_time: self.inner.config.estimated_proof_time.as_secs().max(1),
        };
        self.inner.jobs.insert(job.id, job);
        info!(job_id = %spend.id, kind = %spend.kind, "proof job queued");

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run(spend).await });
        ticket
    }

    pub fn status(&self, id: &JobId) -> Result<JobSnapshot, OrchestratorError> {
        self.inner
            .jobs
            .get(id)
            .map(|job| job.snapshot())
            .ok_or(OrchestratorError::JobNotFound(*id))
    }

    /// Submit a completed withdraw proof through the relayer, which keeps
    /// `fee_bps` of the amount.
    pub async fn relay_withdraw(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<WithdrawReceipt, OrchestratorError> {
        self.ensure_relayer()?;
        let recipient_bytes = parse_recipient(recipient)?;
        let claimed = self.claim(id, ProofKind::Withdraw, recipient_bytes)?;

        let amount = claimed.amount;
        let fee = (u128::from(amount) * u128::from(self.inner.config.relayer.fee_bps) / 10_000) as u64;
        let instruction = RelayInstruction::Withdraw {
            proof: claimed.output,
            nullifier: claimed.nullifier,
            recipient: recipient_bytes,
            amount,
            fee,
        };

        let signature = self.submit_claimed(id, instruction).await?;
        Ok(WithdrawReceipt {
            signature,
            fee,
            amount_sent: amount - fee,
            recipient: recipient.to_string(),
        })
    }

    /// Submit a completed transfer proof. Returns the recipient's recovery
    /// data; the job forgets it afterwards.
    pub async fn relay_transfer(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<TransferReceipt, OrchestratorError> {
        self.ensure_relayer()?;
        let recipient_bytes = parse_recipient(recipient)?;
        let claimed = self.claim(id, ProofKind::Transfer, recipient_bytes)?;

        let (Some(new_commitment), Some(recipient_secret)) =
            (claimed.new_commitment, claimed.recipient_secret)
        else {
            self.inner.release(id);
            return Err(OrchestratorError::WrongKind {
                expected: ProofKind::Transfer,
                actual: ProofKind::Withdraw,
            });
        };
        let instruction = RelayInstruction::Transfer {
            proof: claimed.output,
            nullifier: claimed.nullifier,
            new_commitment,
            amount: claimed.amount,
        };

        let signature = self.submit_claimed(id, instruction).await?;
        Ok(TransferReceipt {
            signature,
            amount: claimed.amount,
            recipient_secret,
            new_commitment,
        })
    }

    fn ensure_relayer(&self) -> Result<(), OrchestratorError> {
        if self.inner.config.relayer.enabled {
            Ok(())
        } else {
            Err(OrchestratorError::RelayerDisabled)
        }
    }

    // Marks the job in flight so a second relay cannot race the first.
    fn claim(
        &self,
        id: &JobId,
        kind: ProofKind,
        recipient: [u8; 32],
    ) -> Result<ClaimedJob, OrchestratorError> {
        let mut job = self
            .inner
            .jobs
            .get_mut(id)
            .ok_or(OrchestratorError::JobNotFound(*id))?;

        if job.kind != kind {
            return Err(OrchestratorError::WrongKind {
                expected: kind,
                actual: job.kind,
            });
        }
        if job.relay != RelayState::NotRelayed {
            return Err(OrchestratorError::AlreadyRelayed(*id));
        }
        let output = match (&job.output, job.status) {
            (Some(output), JobStatus::Completed) => output.clone(),
            (_, status) => return Err(OrchestratorError::JobNotReady { id: *id, status }),
        };
        if job.recipient != Some(recipient) {
            return Err(OrchestratorError::RecipientMismatch);
        }

        job.relay = RelayState::InFlight;
        Ok(ClaimedJob {
            output,
            nullifier: job.nullifier,
            amount: job.amount,
            new_commitment: job.new_commitment,
            recipient_secret: job.recipient_secret.clone(),
        })
    }

    async fn submit_claimed(
        &self,
        id: &JobId,
        instruction: RelayInstruction,
    ) -> Result<TxSignature, OrchestratorError> {
        match self.submit_with_retry(instruction).await {
            Ok(signature) => {
                if let Some(mut job) = self.inner.jobs.get_mut(id) {
                    job.relay = RelayState::Done(signature.clone());
                    job.recipient_secret = None;
                }
                info!(job_id = %id, %signature, "proof relayed");
                Ok(signature)
            }
            Err(e) => {
                warn!(job_id = %id, code = e.code(), error = %e, "relay failed");
                self.inner.release(id);
                Err(e)
            }
        }
    }

    // Unavailable ledgers are retried with backoff; rejections are final.
    async fn submit_with_retry(
        &self,
        instruction: RelayInstruction,
    ) -> Result<TxSignature, OrchestratorError> {
        let ledger = &self.inner.ledger;
        let instruction = &instruction;
        let outcome = poll_with_backoff_cancellable(
            move || async move {
                match ledger.submit(instruction.clone()).await {
                    Ok(signature) => Ok(Ok(signature)),
                    Err(e) if e.category().is_retryable() => Err(e),
                    Err(e) => Ok(Err(e)),
                }
            },
            |_| true,
            &self.inner.config.relay_retry,
            &self.inner.shutdown,
        )
        .await;

        match outcome {
            Ok(result) => Ok(result?),
            Err(PollError::Timeout {
                attempts,
                last_error,
            }) => Err(OrchestratorError::RelayExhausted {
                attempts,
                last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
            }),
            Err(PollError::Cancelled) => Err(OrchestratorError::ShuttingDown),
        }
    }

    /// Drop finished jobs older than the retention window. Jobs with a relay
    /// in flight are kept.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let retention = TimeDelta::from_std(self.inner.config.retention).unwrap_or(TimeDelta::MAX);
        let mut removed = 0;
        self.inner.jobs.retain(|_, job| {
            let keep = match job.finished_at {
                Some(done) if job.relay != RelayState::InFlight => now - done < retention,
                _ => true,
            };
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let this = self.clone();
        let period = self.inner.config.sweep_interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = this.inner.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = this.sweep_at(Utc::now());
                        if removed > 0 {
                            debug!(removed, "expired proof jobs swept");
                        }
                    }
                }
            }
        })
    }

    /// Stop the sweeper and fail jobs still waiting for a worker. Proofs
    /// already running finish normally.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

impl<L: LedgerGateway> Inner<L> {
    async fn run(self: Arc<Self>, spend: PendingSpend) {
        let id = spend.id;
        let permit = tokio::select! {
            _ = self.shutdown.cancelled() => {
                self.finish(id, Err(job_err(&OrchestratorError::ShuttingDown)));
                return;
            }
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    self.finish(id, Err(job_err(&OrchestratorError::ShuttingDown)));
                    return;
                }
            },
        };

        if let Some(mut job) = self.jobs.get_mut(&id) {
            job.status = JobStatus::Generating;
            job.stage = ProofStage::Initializing;
            job.progress = ProofStage::Initializing.progress();
        }
        debug!(job_id = %id, "proof job started");

        let timeout = self.config.job_timeout;
        let result = match tokio::time::timeout(timeout, self.prove(spend, permit)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::new(
                "PROOF_TIMEOUT",
                format!("proof generation exceeded {}s", timeout.as_secs()),
            )),
        };
        self.finish(id, result);
    }

    async fn prove(
        &self,
        spend: PendingSpend,
        permit: OwnedSemaphorePermit,
    ) -> Result<ProofOutput, JobError> {
        let PendingSpend {
            id,
            kind,
            amount,
            secret,
            recipient,
            recipient_secret,
            new_commitment,
            commitment,
            nullifier,
        } = spend;

        let witness = self
            .ledger
            .membership_witness(&commitment)
            .await
            .map_err(|e| job_err(&e))?;
        if self.ledger.is_spent(&nullifier).await.map_err(|e| job_err(&e))? {
            return Err(job_err(&LedgerError::NullifierSpent(nullifier)));
        }

        let statement = SpendStatement::build(&self.scheme, amount, secret, &witness.path, witness.root)
            .map_err(|e| job_err(&e))?;
        let request = match (kind, recipient_secret, new_commitment) {
            (ProofKind::Withdraw, _, _) => ProofRequest::Withdraw {
                public: WithdrawPublicInputs {
                    root: statement.root,
                    nullifier_hash: statement.nullifier.to_field(),
                    recipient,
                    amount,
                },
                spend: statement.witness,
            },
            (ProofKind::Transfer, Some(recipient_secret), Some(new_commitment)) => {
                ProofRequest::Transfer {
                    public: TransferPublicInputs {
                        root: statement.root,
                        nullifier_hash: statement.nullifier.to_field(),
                        new_commitment: new_commitment.to_field(),
                        amount,
                    },
                    spend: statement.witness,
                    recipient_secret,
                }
            }
            (ProofKind::Transfer, _, _) => {
                return Err(JobError::new(
                    "INVALID_WITNESS",
                    "transfer job has no recipient commitment",
                ));
            }
        };

        let prover = self.prover.clone();
        let jobs = self.jobs.clone();
        let output = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            // late reports from a timed-out proof must not touch a failed job
            let sink = move |stage: ProofStage, progress: u8| {
                if let Some(mut job) = jobs.get_mut(&id) {
                    if job.status == JobStatus::Generating {
                        job.stage = stage;
                        job.progress = progress;
                    }
                }
            };
            prover.prove(request, &sink)
        })
        .await
        .map_err(|e| JobError::new("PROVER_PANICKED", e.to_string()))?;

        output.map_err(|e| job_err(&e))
    }

    fn finish(&self, id: JobId, result: Result<ProofOutput, JobError>) {
        let Some(mut job) = self.jobs.get_mut(&id) else {
            return;
        };
        match result {
            Ok(output) => {
                info!(
                    job_id = %id,
                    kind = %job.kind,
                    proving_time_ms = output.proving_time_ms,
                    "proof job completed"
                );
                job.complete(output);
            }
            Err(error) => {
                warn!(job_id = %id, code = %error.code, error = %error.message, "proof job failed");
                job.fail(error);
            }
        }
    }

    // Relay failed: allow another attempt.
    fn release(&self, id: &JobId) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            if job.relay == RelayState::InFlight {
                job.relay = RelayState::NotRelayed;
            }
        }
    }
}
