use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{error, info};

use crate::errors::{ok_envelope, AppError};
use crate::models::portfolio::{CreatePortfolio, Portfolio, PortfolioListFilter};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_portfolios).post(create_portfolio))
        .route("/search", get(search_portfolios))
        .route("/{id}", get(get_portfolio))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub fund_name: String,
    pub limit: Option<i64>,
}

/// §6 `POST /portfolios`: insert/upsert one portfolio (§4.8, keyed by
/// natural key). `id` defaults to a content-free random id when the
/// caller posts directly rather than via workbook ingest (which always
/// supplies the sheet identity). `201` on first insert, `200` when the
/// natural key already existed and this call updated it.
pub async fn create_portfolio(
    State(state): State<AppState>,
    Json(data): Json<CreatePortfolio>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    info!(fund = %data.mutual_fund_name, date = %data.portfolio_date, "POST /portfolios");
    let id = data.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let portfolio = Portfolio::assemble(
        id,
        data.mutual_fund_name,
        data.portfolio_date,
        data.portfolio_holdings,
    );
    let (saved, inserted) = state.portfolio_repo.upsert(&portfolio).await.map_err(|e| {
        error!(error = %e, "failed to upsert portfolio");
        e
    })?;
    let status = if inserted { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, ok_envelope("portfolio saved", saved)))
}

pub async fn list_portfolios(
    State(state): State<AppState>,
    Query(filter): Query<PortfolioListFilter>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!("GET /portfolios");
    let portfolios = state.portfolio_repo.list(filter).await?;
    Ok(ok_envelope("portfolios listed", portfolios))
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(id = %id, "GET /portfolios/{id}");
    let portfolio = state.portfolio_repo.get_by_id(&id).await?;
    Ok(ok_envelope("portfolio found", portfolio))
}

pub async fn search_portfolios(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(fund_name = %q.fund_name, "GET /portfolios/search");
    let portfolios = state
        .portfolio_repo
        .search_by_fund_name(&q.fund_name, q.limit.unwrap_or(100))
        .await?;
    Ok(ok_envelope("search results", portfolios))
}
