use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;

use crate::errors::{ok_envelope, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/{isin}", get(holdings_by_isin))
}

/// §6 `GET /holdings/{isin}`: cross-portfolio scan (§4.8).
pub async fn holdings_by_isin(
    State(state): State<AppState>,
    Path(isin): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(isin = %isin, "GET /holdings/{isin}");
    let holdings = state.portfolio_repo.holdings_by_isin(&isin).await?;
    Ok(ok_envelope("holdings found", holdings))
}
