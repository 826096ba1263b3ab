//! WhaleVault Core
//!
//! Proof orchestration, relaying and the client side of private transfers
//! for the WhaleVault shielded pool.
//!
//! ```text
//!   wallet ──► PrivateTransfer ──► TransferBackend ──► ProofOrchestrator ──► LedgerGateway
//!                 │                  (in-process            │
//!                 ▼                   or HttpBackend)       ▼
//!            PositionStore                           MembershipProver
//! ```

pub mod api;
pub mod client;
pub mod derivation;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod polling;
pub mod position;
pub mod transfer;

pub use client::HttpBackend;
pub use error::{Classify, ErrorCategory};
pub use jobs::{OrchestratorConfig, ProofOrchestrator};
pub use ledger::{InMemoryLedger, LedgerGateway};
pub use position::{Position, PositionStore};
pub use transfer::{PrivateTransfer, TransferBackend, TransferError};
