#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use whalevault_core::jobs::{JobId, JobSnapshot, OrchestratorConfig, SpendRequest};
use whalevault_core::ledger::{
    LedgerError, MembershipWitness, PoolStats, RelayInstruction, TxSignature,
};
use whalevault_core::polling::PollConfig;
use whalevault_core::{InMemoryLedger, LedgerGateway, ProofOrchestrator};
use whalevault_privacy::{Commitment, Nullifier, Secret, commitment};
use whalevault_prover::{MembershipProver, MockProver};

pub const ONE_SOL: u64 = 1_000_000_000;

/// Orchestrator settings that keep tests fast.
pub fn fast_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.relayer.enabled = true;
    config.relayer.fee_bps = 30;
    config.relay_retry = PollConfig::fixed(Duration::from_millis(10), 3);
    config.job_timeout = Duration::from_secs(5);
    config.max_concurrent = 2;
    config
}

pub fn recipient() -> String {
    bs58::encode([9u8; 32]).into_string()
}

pub fn spend_request(secret: &Secret, commitment: &Commitment, amount: u64) -> SpendRequest {
    SpendRequest {
        commitment: commitment.to_hex(),
        secret: secret.to_hex(),
        amount,
        recipient: recipient(),
        denomination: None,
    }
}

pub struct TestFixture<L: LedgerGateway = InMemoryLedger> {
    pub pool: Arc<InMemoryLedger>,
    pub orchestrator: ProofOrchestrator<L>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self::with_prover(Duration::ZERO, config)
    }

    pub fn with_prover(prove_time: Duration, config: OrchestratorConfig) -> Self {
        let prover: Arc<dyn MembershipProver> = Arc::new(MockProver::with_prove_time(prove_time));
        let pool = Arc::new(InMemoryLedger::new(prover.clone()));
        let orchestrator = ProofOrchestrator::new(prover, pool.clone(), config);
        Self { pool, orchestrator }
    }
}

impl TestFixture<FlakyLedger> {
    /// The ledger reports itself unavailable for the first `failures` submits.
    pub fn flaky(failures: u32, config: OrchestratorConfig) -> Self {
        let prover: Arc<dyn MembershipProver> = Arc::new(MockProver::with_prove_time(Duration::ZERO));
        let pool = Arc::new(InMemoryLedger::new(prover.clone()));
        let flaky = Arc::new(FlakyLedger {
            inner: pool.clone(),
            failures_left: AtomicU32::new(failures),
            submits: AtomicU32::new(0),
        });
        let orchestrator = ProofOrchestrator::new(prover, flaky, config);
        Self { pool, orchestrator }
    }
}

impl<L: LedgerGateway> TestFixture<L> {
    /// Shield `amount` under the secret `[secret_byte; 32]`.
    pub fn deposit(&self, amount: u64, secret_byte: u8) -> (Secret, Commitment) {
        let secret = Secret::from_bytes([secret_byte; 32]);
        let commitment = commitment(amount, &secret).unwrap();
        self.pool.deposit(&commitment, amount).unwrap();
        (secret, commitment)
    }

    pub async fn wait_for_terminal(&self, id: &JobId) -> JobSnapshot {
        for _ in 0..500 {
            let snapshot = self.orchestrator.status(id).unwrap();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never finished");
    }
}

/// Wraps the in-memory pool and fails `submit` with `Unavailable` a fixed
/// number of times before passing through.
pub struct FlakyLedger {
    pub inner: Arc<InMemoryLedger>,
    pub failures_left: AtomicU32,
    pub submits: AtomicU32,
}

impl LedgerGateway for FlakyLedger {
    async fn membership_witness(
        &self,
        commitment: &Commitment,
    ) -> Result<MembershipWitness, LedgerError> {
        self.inner.membership_witness(commitment).await
    }

    async fn is_spent(&self, nullifier: &Nullifier) -> Result<bool, LedgerError> {
        self.inner.is_spent(nullifier).await
    }

    async fn submit(&self, instruction: RelayInstruction) -> Result<TxSignature, LedgerError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(LedgerError::Unavailable("rpc timeout".into()));
        }
        self.inner.submit(instruction).await
    }

    async fn is_confirmed(&self, signature: &TxSignature) -> Result<bool, LedgerError> {
        self.inner.is_confirmed(signature).await
    }

    async fn pool_stats(&self) -> Result<PoolStats, LedgerError> {
        self.inner.pool_stats().await
    }
}
