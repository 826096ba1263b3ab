mod common;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use common::*;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use whalevault_core::api::{ApiState, create_router};
use whalevault_core::derivation::{Ed25519Signer, SecretDeriver};
use whalevault_core::jobs::JobId;
use whalevault_core::polling::PollConfig;
use whalevault_core::{
    Classify, ErrorCategory, HttpBackend, PositionStore, PrivateTransfer, TransferBackend,
};
use whalevault_privacy::{Nullifier, Secret, commitment};

async fn serve(fixture: &TestFixture, dev_mode: bool) -> HttpBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(ApiState::new(fixture.orchestrator.clone(), dev_mode));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    HttpBackend::new(format!("http://{addr}")).unwrap()
}

fn wallet(seed: u8, backend: Arc<HttpBackend>) -> PrivateTransfer<Ed25519Signer, HttpBackend> {
    PrivateTransfer::new(
        SecretDeriver::new(Ed25519Signer::from_seed([seed; 32]), "solana:devnet", 1),
        backend,
        Arc::new(PositionStore::new()),
    )
    .with_polling(
        PollConfig::fixed(Duration::from_millis(10), 300),
        PollConfig::fixed(Duration::from_millis(10), 20),
    )
}

#[tokio::test]
async fn test_health_and_relayer_info() {
    let fixture = TestFixture::new();
    let client = serve(&fixture, false).await;

    let health = client.health().await.unwrap();
    assert!(health.healthy);
    assert!(health.relayer_enabled);
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

    let info = client.relay_info().await.unwrap();
    assert!(info.enabled);
    assert_eq!(info.fee_bps, 30);
}

#[tokio::test]
async fn test_commitment_and_shield_prepare() {
    let fixture = TestFixture::new();
    let client = serve(&fixture, false).await;
    let secret = Secret::from_bytes([4; 32]);

    let computed = client.compute_commitment(ONE_SOL, &secret).await.unwrap();
    assert_eq!(computed, commitment(ONE_SOL, &secret).unwrap());

    let err = client.compute_commitment(10, &secret).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_AMOUNT");
    assert_eq!(err.category(), ErrorCategory::Validation);

    let prepared = client
        .prepare_shield(ONE_SOL, &computed, Some(ONE_SOL))
        .await
        .unwrap();
    let data = BASE64.decode(&prepared.instruction_data).unwrap();
    assert_eq!(data.len(), 48);
    assert_eq!(&data[8..40], computed.as_bytes());
    assert_eq!(&data[40..], &ONE_SOL.to_le_bytes());

    let err = client
        .prepare_shield(ONE_SOL, &computed, Some(3 * ONE_SOL))
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
}

#[tokio::test]
async fn test_errors_keep_their_codes() {
    let fixture = TestFixture::new();
    let client = serve(&fixture, false).await;
    let (secret, c) = fixture.deposit(ONE_SOL, 1);

    let err = client.job_status(&JobId::new()).await.unwrap_err();
    assert_eq!(err.code(), "JOB_NOT_FOUND");
    assert_eq!(err.category(), ErrorCategory::Validation);

    let err = client
        .request_withdraw_proof(&spend_request(&secret, &c, 10))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_AMOUNT");

    let err = client
        .relay_withdraw(&JobId::new(), &recipient())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "JOB_NOT_FOUND");

    let err = client.dev_shield(&c, ONE_SOL).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND", "dev routes are off outside dev mode");

    assert!(!client.nullifier_spent(&Nullifier([1; 32])).await.unwrap());
}

#[tokio::test]
async fn test_server_unreachable_is_transient() {
    let client = HttpBackend::new("http://127.0.0.1:1").unwrap();
    let err = client.health().await.unwrap_err();
    assert_eq!(err.code(), "HTTP_UNAVAILABLE");
    assert!(err.category().is_retryable());
}

#[tokio::test]
async fn test_private_transfer_over_http() {
    let fixture = TestFixture::new();
    let client = Arc::new(serve(&fixture, true).await);
    let alice = wallet(1, client.clone());
    let bob = wallet(2, client.clone());
    let cancel = CancellationToken::new();

    let plan = alice.shield(ONE_SOL, Some(ONE_SOL)).await.unwrap();
    let shielded = client
        .dev_shield(&plan.position.commitment, ONE_SOL)
        .await
        .unwrap();
    assert_eq!(shielded.leaf_index, 0);

    let outcome = alice
        .transfer(&plan.position.id, &recipient(), &cancel)
        .await
        .unwrap();

    let received = bob.import(&outcome.payload.to_text()).unwrap();
    let unshielded = bob
        .unshield(&received.id, &recipient(), &cancel)
        .await
        .unwrap();
    assert_eq!(unshielded.amount_sent, 997_000_000);

    let stats = client.pool_status().await.unwrap();
    assert_eq!(stats.total_value_locked, 0);
    assert_eq!(stats.total_deposits, 1);
    assert_eq!(stats.anonymity_set_size, 2);
}
