//! Proof job records and their public snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use whalevault_privacy::{Commitment, Nullifier, Secret};
use whalevault_prover::{ProofKind, ProofOutput, ProofStage};

use crate::error::Classify;
use crate::ledger::TxSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// `pending -> generating -> completed | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Structured failure kept on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub(crate) fn job_err<E: Classify + fmt::Display>(e: &E) -> JobError {
    JobError::new(e.code(), e.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayState {
    NotRelayed,
    InFlight,
    Done(TxSignature),
}

/// Everything the orchestrator tracks for one job.
///
/// The only secret ever stored here is the recipient secret of a transfer,
/// kept until the relay hands it back to the sender.
#[derive(Debug, Clone)]
pub struct ProofJob {
    pub id: JobId,
    pub kind: ProofKind,
    pub status: JobStatus,
    pub progress: u8,
    pub stage: ProofStage,
    pub amount: u64,
    /// Withdraw recipient bytes
    pub recipient: Option<[u8; 32]>,
    pub nullifier: Nullifier,
    pub new_commitment: Option<Commitment>,
    pub recipient_secret: Option<Secret>,
    pub output: Option<ProofOutput>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub relay: RelayState,
}

impl ProofJob {
    pub fn new(kind: ProofKind, amount: u64, nullifier: Nullifier) -> Self {
        Self {
            id: JobId::new(),
            kind,
            status: JobStatus::Pending,
            progress: 0,
            stage: ProofStage::Initializing,
            amount,
            recipient: None,
            nullifier,
            new_commitment: None,
            recipient_secret: None,
            output: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
            relay: RelayState::NotRelayed,
        }
    }

    pub fn complete(&mut self, output: ProofOutput) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.stage = ProofStage::Finalizing;
        self.output = Some(output);
        self.finished_at = Some(Utc::now());
    }

    /// Failing a transfer job also drops the recipient secret; nobody will
    /// relay it.
    pub fn fail(&mut self, error: JobError) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.recipient_secret = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let result = self.output.as_ref().map(|output| ProofResult {
            proof: hex::encode(&output.proof),
            public_inputs: output.public_inputs.iter().map(hex::encode).collect(),
            nullifier: self.nullifier.to_hex(),
            root: output.public_inputs.first().map(hex::encode).unwrap_or_default(),
            new_commitment: self.new_commitment.map(|c| c.to_hex()),
            proving_time_ms: output.proving_time_ms,
        });

        JobSnapshot {
            job_id: self.id,
            kind: self.kind,
            status: self.status,
            progress: self.progress,
            stage: self.stage,
            result,
            error: self.error.clone(),
            created_at: self.created_at,
            finished_at: self.finished_at,
            relayed: matches!(self.relay, RelayState::Done(_)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofResult {
    pub proof: String,
    pub public_inputs: Vec<String>,
    pub nullifier: String,
    pub root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_commitment: Option<String>,
    pub proving_time_ms: u64,
}

/// Job state as reported to pollers. Never carries a secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub kind: ProofKind,
    pub status: JobStatus,
    pub progress: u8,
    pub stage: ProofStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ProofResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub relayed: bool,
}
