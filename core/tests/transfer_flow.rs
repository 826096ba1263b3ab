mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use tokio_util::sync::CancellationToken;
use whalevault_core::derivation::{Ed25519Signer, SecretDeriver};
use whalevault_core::jobs::{
    JobId, JobSnapshot, JobTicket, SpendRequest, TransferReceipt, WithdrawReceipt,
};
use whalevault_core::ledger::TxSignature;
use whalevault_core::polling::PollConfig;
use whalevault_core::position::PositionStatus;
use whalevault_core::transfer::{BackendError, TransferPhase};
use whalevault_core::{
    Classify, ErrorCategory, InMemoryLedger, LedgerGateway, PositionStore, PrivateTransfer, ProofOrchestrator,
    TransferBackend, TransferError,
};
use whalevault_privacy::{Nullifier, TransferPayload};

type Local = ProofOrchestrator<InMemoryLedger>;

fn wallet<B: TransferBackend>(seed: u8, backend: Arc<B>) -> PrivateTransfer<Ed25519Signer, B> {
    PrivateTransfer::new(
        SecretDeriver::new(Ed25519Signer::from_seed([seed; 32]), "solana:devnet", 1),
        backend,
        Arc::new(PositionStore::new()),
    )
    .with_polling(
        PollConfig::fixed(Duration::from_millis(10), 300),
        PollConfig::fixed(Duration::from_millis(10), 5),
    )
}

#[tokio::test]
async fn test_shield_transfer_import_unshield() {
    let fixture = TestFixture::new();
    let backend = Arc::new(fixture.orchestrator.clone());

    let phases = Arc::new(Mutex::new(Vec::new()));
    let seen = phases.clone();
    let alice = wallet(1, backend.clone()).with_observer(move |phase: TransferPhase| {
        seen.lock().unwrap().push(phase);
    });
    let bob = wallet(2, backend);

    let plan = alice.shield(ONE_SOL, Some(ONE_SOL)).await.unwrap();
    assert_eq!(plan.instruction_data.len(), 8 + 32 + 8);
    assert!(!plan.position.source.is_stored(), "shielded positions keep only the nonce");
    fixture.pool.deposit(&plan.position.commitment, ONE_SOL).unwrap();

    let cancel = CancellationToken::new();
    let outcome = alice
        .transfer(&plan.position.id, &recipient(), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.payload.amount, ONE_SOL);
    assert_eq!(
        alice.positions().get(&plan.position.id).unwrap().status,
        PositionStatus::Transferred
    );

    {
        let phases = phases.lock().unwrap();
        let order: Vec<_> = phases
            .iter()
            .filter(|p| !matches!(p, TransferPhase::Generating { .. }))
            .copied()
            .collect();
        assert_eq!(
            order,
            vec![
                TransferPhase::Deriving,
                TransferPhase::Requesting,
                TransferPhase::Relaying,
                TransferPhase::Confirming,
                TransferPhase::Success,
            ]
        );
        assert!(phases.contains(&TransferPhase::Generating { progress: 100 }));
    }

    let received = bob.import(&outcome.payload.to_text()).unwrap();
    assert_eq!(received.amount, ONE_SOL);
    assert!(received.source.is_stored());

    let unshielded = bob
        .unshield(&received.id, &recipient(), &cancel)
        .await
        .unwrap();
    assert_eq!(unshielded.fee, 3_000_000);
    assert_eq!(unshielded.amount_sent, 997_000_000);
    assert_eq!(
        bob.positions().get(&received.id).unwrap().status,
        PositionStatus::Unshielded
    );

    let stats = fixture.pool.pool_stats().await.unwrap();
    assert_eq!(stats.total_value_locked, 0);
    assert_eq!(stats.anonymity_set_size, 2);
}

#[tokio::test]
async fn test_failed_proof_leaves_position_active() {
    let fixture = TestFixture::new();
    let alice = wallet(1, Arc::new(fixture.orchestrator.clone()));

    // Never deposited: the proof job cannot find the commitment.
    let plan = alice.shield(ONE_SOL, None).await.unwrap();
    let err = alice
        .unshield(&plan.position.id, &recipient(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::ProofFailed(_)), "got {err:?}");
    assert_eq!(err.code(), "COMMITMENT_NOT_FOUND");
    assert!(alice.positions().get(&plan.position.id).unwrap().is_active());
}

/// Passes everything through but never reports a signature as confirmed.
struct Unconfirmed {
    inner: Local,
    nullifier_visible: bool,
}

impl TransferBackend for Unconfirmed {
    async fn request_withdraw_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        self.inner.request_withdraw_proof(request).await
    }

    async fn request_transfer_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        self.inner.request_transfer_proof(request).await
    }

    async fn job_status(&self, id: &JobId) -> Result<JobSnapshot, BackendError> {
        self.inner.job_status(id).await
    }

    async fn relay_withdraw(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<WithdrawReceipt, BackendError> {
        TransferBackend::relay_withdraw(&self.inner, id, recipient).await
    }

    async fn relay_transfer(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<TransferReceipt, BackendError> {
        TransferBackend::relay_transfer(&self.inner, id, recipient).await
    }

    async fn is_confirmed(&self, _signature: &TxSignature) -> Result<bool, BackendError> {
        Ok(false)
    }

    async fn nullifier_spent(&self, nullifier: &Nullifier) -> Result<bool, BackendError> {
        if self.nullifier_visible {
            self.inner.nullifier_spent(nullifier).await
        } else {
            Ok(false)
        }
    }
}

#[tokio::test]
async fn test_confirmation_falls_back_to_nullifier_registry() {
    let fixture = TestFixture::new();
    let alice = wallet(
        1,
        Arc::new(Unconfirmed {
            inner: fixture.orchestrator.clone(),
            nullifier_visible: true,
        }),
    );

    let plan = alice.shield(ONE_SOL, None).await.unwrap();
    fixture.pool.deposit(&plan.position.commitment, ONE_SOL).unwrap();

    alice
        .transfer(&plan.position.id, &recipient(), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unconfirmed_transfer_carries_recovery() {
    let fixture = TestFixture::new();
    let alice = wallet(
        1,
        Arc::new(Unconfirmed {
            inner: fixture.orchestrator.clone(),
            nullifier_visible: false,
        }),
    );

    let plan = alice.shield(ONE_SOL, None).await.unwrap();
    fixture.pool.deposit(&plan.position.commitment, ONE_SOL).unwrap();

    let err = alice
        .transfer(&plan.position.id, &recipient(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONFIRMATION_FAILED");
    assert!(err.category().is_retryable());

    let recovery: TransferPayload = err.recovery().cloned().expect("recovery payload");
    assert_eq!(recovery.amount, ONE_SOL);
    assert!(
        fixture.pool.membership_witness(&recovery.commitment).await.is_ok(),
        "the relayed commitment is in the pool"
    );
    assert_eq!(
        alice.positions().get(&plan.position.id).unwrap().status,
        PositionStatus::Transferred,
        "relayed funds have left the position"
    );
}

/// Counts transfer proof requests and answers them a little late.
struct SlowRequests {
    inner: Local,
    transfer_requests: AtomicU32,
}

impl TransferBackend for SlowRequests {
    async fn request_withdraw_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        self.inner.request_withdraw_proof(request).await
    }

    async fn request_transfer_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        self.transfer_requests.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.inner.request_transfer_proof(request).await
    }

    async fn job_status(&self, id: &JobId) -> Result<JobSnapshot, BackendError> {
        self.inner.job_status(id).await
    }

    async fn relay_withdraw(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<WithdrawReceipt, BackendError> {
        TransferBackend::relay_withdraw(&self.inner, id, recipient).await
    }

    async fn relay_transfer(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<TransferReceipt, BackendError> {
        TransferBackend::relay_transfer(&self.inner, id, recipient).await
    }

    async fn is_confirmed(&self, signature: &TxSignature) -> Result<bool, BackendError> {
        self.inner.is_confirmed(signature).await
    }

    async fn nullifier_spent(&self, nullifier: &Nullifier) -> Result<bool, BackendError> {
        self.inner.nullifier_spent(nullifier).await
    }
}

#[tokio::test]
async fn test_concurrent_spends_of_one_position() {
    let fixture = TestFixture::new();
    let backend = Arc::new(SlowRequests {
        inner: fixture.orchestrator.clone(),
        transfer_requests: AtomicU32::new(0),
    });
    let alice = wallet(1, backend.clone());

    let plan = alice.shield(ONE_SOL, None).await.unwrap();
    fixture.pool.deposit(&plan.position.commitment, ONE_SOL).unwrap();

    let id = plan.position.id;
    let to = recipient();
    let cancel = CancellationToken::new();
    let (first, second) = tokio::join!(
        alice.transfer(&id, &to, &cancel),
        alice.transfer(&id, &to, &cancel)
    );

    first.unwrap();
    let err = second.unwrap_err();
    assert_eq!(err.code(), "SPEND_IN_PROGRESS");
    assert_eq!(backend.transfer_requests.load(Ordering::SeqCst), 1);
    assert_eq!(
        alice.positions().get(&id).unwrap().status,
        PositionStatus::Transferred
    );
    assert!(!alice.positions().is_spending(&id));
}

/// Reports every relay as a dropped connection, optionally after relaying.
struct LostReceipt {
    inner: Local,
    submitted: bool,
}

impl LostReceipt {
    fn reset() -> BackendError {
        BackendError::new(ErrorCategory::Transient, "RELAY_UNAVAILABLE", "connection reset")
    }
}

impl TransferBackend for LostReceipt {
    async fn request_withdraw_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        self.inner.request_withdraw_proof(request).await
    }

    async fn request_transfer_proof(&self, request: &SpendRequest) -> Result<JobTicket, BackendError> {
        self.inner.request_transfer_proof(request).await
    }

    async fn job_status(&self, id: &JobId) -> Result<JobSnapshot, BackendError> {
        self.inner.job_status(id).await
    }

    async fn relay_withdraw(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<WithdrawReceipt, BackendError> {
        if self.submitted {
            TransferBackend::relay_withdraw(&self.inner, id, recipient).await?;
        }
        Err(Self::reset())
    }

    async fn relay_transfer(
        &self,
        id: &JobId,
        recipient: &str,
    ) -> Result<TransferReceipt, BackendError> {
        if self.submitted {
            TransferBackend::relay_transfer(&self.inner, id, recipient).await?;
        }
        Err(Self::reset())
    }

    async fn is_confirmed(&self, signature: &TxSignature) -> Result<bool, BackendError> {
        self.inner.is_confirmed(signature).await
    }

    async fn nullifier_spent(&self, nullifier: &Nullifier) -> Result<bool, BackendError> {
        self.inner.nullifier_spent(nullifier).await
    }
}

#[tokio::test]
async fn test_lost_transfer_receipt_marks_position_spent() {
    let fixture = TestFixture::new();
    let alice = wallet(
        1,
        Arc::new(LostReceipt {
            inner: fixture.orchestrator.clone(),
            submitted: true,
        }),
    );

    let plan = alice.shield(ONE_SOL, None).await.unwrap();
    fixture.pool.deposit(&plan.position.commitment, ONE_SOL).unwrap();

    let err = alice
        .transfer(&plan.position.id, &recipient(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RECEIPT_LOST");
    assert!(!err.category().is_retryable());
    assert!(err.recovery().is_none());
    assert_eq!(
        alice.positions().get(&plan.position.id).unwrap().status,
        PositionStatus::Transferred
    );

    let stats = fixture.pool.pool_stats().await.unwrap();
    assert_eq!(stats.anonymity_set_size, 2, "the new leaf landed");
}

#[tokio::test]
async fn test_lost_unshield_receipt_marks_position_spent() {
    let fixture = TestFixture::new();
    let alice = wallet(
        1,
        Arc::new(LostReceipt {
            inner: fixture.orchestrator.clone(),
            submitted: true,
        }),
    );

    let plan = alice.shield(ONE_SOL, None).await.unwrap();
    fixture.pool.deposit(&plan.position.commitment, ONE_SOL).unwrap();

    let err = alice
        .unshield(&plan.position.id, &recipient(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RECEIPT_LOST");
    assert_eq!(
        alice.positions().get(&plan.position.id).unwrap().status,
        PositionStatus::Unshielded
    );
}

#[tokio::test]
async fn test_relay_failure_before_submit_keeps_position() {
    let fixture = TestFixture::new();
    let alice = wallet(
        1,
        Arc::new(LostReceipt {
            inner: fixture.orchestrator.clone(),
            submitted: false,
        }),
    );

    let plan = alice.shield(ONE_SOL, None).await.unwrap();
    fixture.pool.deposit(&plan.position.commitment, ONE_SOL).unwrap();

    let err = alice
        .transfer(&plan.position.id, &recipient(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "RELAY_UNAVAILABLE");
    assert!(err.category().is_retryable());
    assert!(alice.positions().get(&plan.position.id).unwrap().is_active());
    assert!(!alice.positions().is_spending(&plan.position.id));
}
