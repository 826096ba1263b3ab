//! HTTP API
//!
//! axum server exposing proof jobs, the relayer and pool queries.

pub mod handlers;
pub mod routes;
pub mod types;

pub use handlers::{ApiError, ApiState};
pub use routes::create_router;
