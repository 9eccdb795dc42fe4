pub mod agents;
pub mod executions;
pub mod workflows;
pub mod ws;

use axum::Json;

// GET /api/v1/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
