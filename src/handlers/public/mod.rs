mod contracts;
mod orders;

pub use contracts::*;
pub use orders::*;

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Polled by the checkout success page until the webhook has landed
        .route("/orders/{session_id}", get(get_order_status))
        .route("/contracts/{*path}", get(get_contract_file))
}
