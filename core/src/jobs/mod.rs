//! Proof jobs: validation, job records and the orchestrator that runs them.

pub mod job;
pub mod orchestrator;
pub mod validation;

pub use job::{JobError, JobId, JobSnapshot, JobStatus, ProofJob, ProofResult, RelayState};
pub use orchestrator::{
    JobTicket, OrchestratorConfig, OrchestratorError, ProofOrchestrator, RelayerInfo,
    SpendRequest, TransferReceipt, WithdrawReceipt,
};
pub use validation::{AmountRules, ValidationError, parse_recipient};
