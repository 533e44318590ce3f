use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;
use uuid::Uuid;

use crate::errors::{ok_envelope, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/{id}/recover", post(recover_one))
        .route("/jobs/recover-all", post(recover_all))
}

#[derive(Debug, serde::Deserialize, Default)]
pub struct RecoverOneBody {
    #[serde(default)]
    pub to_failed: bool,
}

/// §4.4 operator override: force a specific job back to `queued` or to
/// `failed`, regardless of lease state.
pub async fn recover_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<RecoverOneBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let to_failed = body.map(|b| b.0.to_failed).unwrap_or(false);
    info!(job_id = %id, to_failed, "POST /admin/jobs/{id}/recover");
    let job = state.recovery.force_one(id, to_failed).await?;
    Ok(ok_envelope("job recovery applied", job))
}

/// §4.4 operator override: force every currently-stuck job back to `queued`.
pub async fn recover_all(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    info!("POST /admin/jobs/recover-all");
    let reclaimed = state.recovery.force_all().await?;
    Ok(ok_envelope("stuck jobs recovered", serde_json::json!({"reclaimed": reclaimed})))
}
