//! WhaleVault Proof Service
//!
//! Serves proof jobs and the relayer over HTTP, backed by an in-memory pool
//! ledger.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  WhaleVault Proof Service                │
//! │                                                          │
//! │  ┌─────────────┐   ┌───────────────────┐   ┌──────────┐  │
//! │  │  HTTP API   │──►│ ProofOrchestrator │──►│  Prover  │  │
//! │  │  (axum)     │   │ (jobs, relayer)   │   │ (mock /  │  │
//! │  └─────────────┘   └─────────┬─────────┘   │ groth16) │  │
//! │                              ▼             └──────────┘  │
//! │                     ┌─────────────────┐                  │
//! │                     │ InMemoryLedger  │                  │
//! │                     └─────────────────┘                  │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whalevault_config::{ProverMode, VaultConfig};
use whalevault_core::api::{ApiState, create_router};
use whalevault_core::derivation::Ed25519Signer;
use whalevault_core::{InMemoryLedger, OrchestratorConfig, ProofOrchestrator};
use whalevault_prover::{Groth16Prover, MembershipProver, MockProver};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("whalevault_core=info,tower_http=info")),
        )
        .init();

    let config = VaultConfig::load()?;

    info!("============================================");
    info!("      WHALEVAULT PROOF SERVICE v{}", env!("CARGO_PKG_VERSION"));
    info!("============================================");
    info!("Bind address      : {}", config.api.bind_addr());
    info!("Prover mode       : {:?}", config.prover.mode);
    info!("Max proofs        : {}", config.prover.max_concurrent_proofs);
    info!("Relayer           : {}", config.relayer.enabled);
    info!("Relayer fee       : {} bps", config.relayer.fee_bps);
    info!("Dev mode          : {}", config.features.dev_mode);
    info!("============================================");

    let prover: Arc<dyn MembershipProver> = match config.prover.mode {
        ProverMode::Groth16 => {
            let dir = Path::new(&config.prover.keys_dir);
            let prover = Groth16Prover::from_dir(dir)
                .with_context(|| format!("failed to load proving keys from {}", dir.display()))?;
            Arc::new(prover)
        }
        ProverMode::Mock => {
            warn!("Using mock prover; proofs are not zero-knowledge");
            Arc::new(MockProver::with_prove_time(Duration::from_millis(
                config.prover.mock_prove_time_ms,
            )))
        }
    };
    let ledger = Arc::new(InMemoryLedger::new(prover.clone()));

    let mut orchestrator_config = OrchestratorConfig::from_config(&config);
    if let Some(path) = &config.relayer.keypair_path {
        let address = relayer_address(Path::new(path))?;
        info!("Relayer address   : {}", address);
        orchestrator_config = orchestrator_config.with_relayer_address(address);
    }

    let orchestrator = ProofOrchestrator::new(prover, ledger, orchestrator_config);
    let sweeper = orchestrator.spawn_sweeper();

    let app = create_router(ApiState::new(
        orchestrator.clone(),
        config.features.dev_mode,
    ));
    let listener = TcpListener::bind(config.api.bind_addr()).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown();
    if let Err(e) = sweeper.await {
        warn!("Sweeper task ended abnormally: {}", e);
    }
    info!("Shutdown complete");
    Ok(())
}

/// Solana-style keypair file: a JSON array of 64 bytes.
fn relayer_address(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read relayer keypair {}", path.display()))?;
    let bytes: Vec<u8> = serde_json::from_str(&contents)
        .with_context(|| format!("relayer keypair {} is not a byte array", path.display()))?;
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("relayer keypair has {} bytes, expected 64", v.len()))?;
    let key = SigningKey::from_keypair_bytes(&bytes).context("invalid relayer keypair")?;
    Ok(Ed25519Signer::new(key).address())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await
        }
    }
}
