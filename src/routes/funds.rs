use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;

use crate::errors::{ok_envelope, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/{name}/statistics", get(fund_statistics))
}

/// §6 `GET /funds/{name}/statistics` (§4.8 `fund_statistics`).
pub async fn fund_statistics(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(fund = %name, "GET /funds/{name}/statistics");
    let stats = state.portfolio_repo.fund_statistics(&name).await?;
    Ok(ok_envelope("fund statistics", stats))
}
