//! API Routes
//!
//! Router configuration for the WhaleVault proof service.

use axum::{
    Json, Router,
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, ApiState};
use super::types::ErrorResponse;

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    let mut router = Router::new()
        // Health & pool
        .route("/api/health", get(handlers::health))
        .route("/api/pool/status", get(handlers::pool_status))
        // Commitments & shielding
        .route("/api/commitment/compute", post(handlers::compute_commitment))
        .route("/api/shield/prepare", post(handlers::prepare_shield))
        // Proof jobs
        .route("/api/unshield/proof", post(handlers::request_unshield_proof))
        .route("/api/transfer/proof", post(handlers::request_transfer_proof))
        .route("/api/proof/status/{job_id}", get(handlers::proof_status))
        // Relayer
        .route("/api/relay/unshield", post(handlers::relay_unshield))
        .route("/api/relay/transfer", post(handlers::relay_transfer))
        .route("/api/relay/info", get(handlers::relay_info))
        // Confirmation
        .route("/api/tx/{signature}", get(handlers::tx_status))
        .route("/api/nullifier/{nullifier}", get(handlers::nullifier_status));

    if state.dev_mode {
        router = router.route("/api/dev/shield", post(handlers::dev_shield));
    }

    router
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::not_found(format!("no route for {uri}"))),
    )
}
