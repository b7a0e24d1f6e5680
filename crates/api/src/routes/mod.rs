//! Route table

pub mod callback;
pub mod jobs;
pub mod payments;

use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/payments", post(payments::create_payment))
        .route(
            "/api/payments/{reference}/status",
            get(payments::payment_status),
        )
        .route(
            "/api/payments/{reference}/cancel",
            post(payments::cancel_payment),
        )
        .route("/api/callbacks/payment", post(callback::payment_callback))
        .route("/api/jobs/process", get(jobs::process_job))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
