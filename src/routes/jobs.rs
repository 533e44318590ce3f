use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::errors::{ok_envelope, AppError};
use crate::models::job::JobListFilter;
use crate::routes::upload::upload_excel_async;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/upload-excel-async", post(upload_excel_async))
        .route("/{id}/status", get(job_status))
        .route("/{id}/result", get(job_result))
        .route("/{id}/cancel", post(cancel_job))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<JobListFilter>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!("GET /jobs");
    let jobs = state.scheduler.list(filter).await?;
    Ok(ok_envelope("jobs listed", jobs))
}

/// §6 `GET /jobs/{id}/status`: status + progress only.
pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(job_id = %id, "GET /jobs/{id}/status");
    let job = state.scheduler.get(id).await?;
    Ok(ok_envelope(
        "job status",
        json!({
            "job_id": job.id,
            "status": job.status.as_str(),
            "progress": job.progress,
        }),
    ))
}

/// §6 `GET /jobs/{id}/result`: terminal result or error. A job-level
/// failure is still a `200` (§7 C0 addendum) — the job subsystem's own
/// error taxonomy never surfaces as a transport-level `5xx`.
pub async fn job_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(job_id = %id, "GET /jobs/{id}/result");
    let job = state.scheduler.get(id).await?;
    Ok(ok_envelope(
        "job result",
        json!({
            "job_id": job.id,
            "status": job.status.as_str(),
            "result": job.result,
            "error": job.error,
            "webhook_error": job.webhook_error,
        }),
    ))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    info!(job_id = %id, "POST /jobs/{id}/cancel");
    let job = state.scheduler.cancel(id).await?;
    Ok(ok_envelope("cancellation requested", job))
}
