use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::{info, warn};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

/// §6 `GET /health`: liveness plus a store ping, the way the reference
/// backend's own health route stays a thin, dependency-free check.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    info!("GET /health");
    let store_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    if !store_ok {
        warn!("health check: document store unreachable");
    }
    Json(json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "store": if store_ok { "up" } else { "down" },
    }))
}
