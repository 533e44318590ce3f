use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::errors::{ok_envelope, AppError};
use crate::models::job::{JobKind, SubmitOptions};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/fetch-holdings/{symbol}", post(fetch_one))
        .route("/fetch-all-holdings", post(fetch_all))
        .route("/holdings/{symbol}", get(holdings_snapshot))
        .route("/stats", get(stats))
        .route("/search", get(search))
}

#[derive(Debug, Deserialize)]
pub struct FetchAllQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub limit: Option<i64>,
}

/// §6 `POST /etf/fetch-holdings/{symbol}`: async single-symbol fetch.
pub async fn fetch_one(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    info!(symbol = %symbol, "POST /etf/fetch-holdings/{symbol}");
    let job = state
        .scheduler
        .submit(
            JobKind::FetchHoldingsOne,
            json!({"symbol": symbol}),
            1,
            SubmitOptions {
                callback_url: None,
                user_id: None,
            },
        )
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        ok_envelope("job queued", json!({"job_id": job.id, "status": job.status.as_str()})),
    ))
}

/// §6 `POST /etf/fetch-all-holdings?limit=`: async fleet fetch.
pub async fn fetch_all(
    State(state): State<AppState>,
    Query(q): Query<FetchAllQuery>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    info!(limit = ?q.limit, "POST /etf/fetch-all-holdings");
    let job = state
        .scheduler
        .submit(
            JobKind::FetchHoldingsAll,
            json!({"limit": q.limit}),
            0,
            SubmitOptions {
                callback_url: None,
                user_id: None,
            },
        )
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        ok_envelope("job queued", json!({"job_id": job.id, "status": job.status.as_str()})),
    ))
}

pub async fn holdings_snapshot(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(symbol = %symbol, "GET /etf/holdings/{symbol}");
    let snapshot = state.holdings_repo.get_by_symbol(&symbol).await?;
    Ok(ok_envelope("holdings snapshot", snapshot))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    info!("GET /etf/stats");
    let stats = state.holdings_repo.stats().await?;
    Ok(ok_envelope("etf holdings stats", stats))
}

pub async fn search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(query = %q.query, "GET /etf/search");
    let results = state
        .holdings_repo
        .search_metadata(&q.query, q.limit.unwrap_or(25))
        .await?;
    Ok(ok_envelope("etf metadata search results", results))
}
