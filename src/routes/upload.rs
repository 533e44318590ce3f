use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use tracing::{error, info};

use crate::errors::{ok_envelope, AppError};
use crate::handlers::workbook_ingest::{IngestOutcome, WorkbookIngestPayload};
use crate::models::job::{JobKind, SubmitOptions};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/upload/excel", post(upload_excel_sync))
}

struct ParsedUpload {
    workbook_hex: String,
    parse_method: String,
    portfolio_date: String,
    callback_url: Option<String>,
    user_id: Option<String>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<ParsedUpload, AppError> {
    let mut workbook_bytes: Option<Vec<u8>> = None;
    let mut parse_method = "manual".to_string();
    let mut portfolio_date: Option<String> = None;
    let mut callback_url = None;
    let mut user_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("failed to read file field: {e}")))?;
                workbook_bytes = Some(bytes.to_vec());
            }
            "parse_method" => {
                parse_method = field.text().await.unwrap_or_else(|_| "manual".to_string());
            }
            "portfolio_date" => {
                portfolio_date = field.text().await.ok();
            }
            "callback_url" => {
                callback_url = field.text().await.ok().filter(|s| !s.is_empty());
            }
            "user_id" => {
                user_id = field.text().await.ok().filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    let workbook_bytes =
        workbook_bytes.ok_or_else(|| AppError::Validation("missing required `file` field".to_string()))?;
    let portfolio_date = portfolio_date
        .ok_or_else(|| AppError::Validation("missing required `portfolio_date` field".to_string()))?;

    if !matches!(parse_method.as_str(), "manual" | "llm") {
        return Err(AppError::Validation(format!(
            "parse_method must be 'manual' or 'llm', got '{parse_method}'"
        )));
    }

    Ok(ParsedUpload {
        workbook_hex: hex::encode(workbook_bytes),
        parse_method,
        portfolio_date,
        callback_url,
        user_id,
    })
}

/// §6 `POST /upload/excel`: synchronous workbook ingest, blocking on the
/// request — the same pipeline as the `workbook_ingest` job handler
/// (§4.6), run inline for small inputs rather than via the job subsystem.
pub async fn upload_excel_sync(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    info!("POST /upload/excel");
    let parsed = read_multipart(multipart).await?;
    let payload = WorkbookIngestPayload {
        workbook_hex: parsed.workbook_hex,
        parse_method: parsed.parse_method,
        portfolio_date: parsed.portfolio_date,
    };

    let outcome = state
        .workbook_ingest
        .ingest_all_sheets(&payload, |_| {}, || false)
        .await;

    match outcome {
        IngestOutcome::Completed(result) => Ok(ok_envelope("workbook ingested", result)),
        IngestOutcome::Failed(e) => {
            error!(kind = ?e.kind, message = %e.message, "synchronous workbook ingest failed");
            Err(AppError::Validation(e.message))
        }
    }
}

/// §6 `POST /jobs/upload-excel-async`: submits a `workbook_ingest` job and
/// returns immediately with `{job_id, status:"queued"}` (`202`).
pub async fn upload_excel_async(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), AppError> {
    info!("POST /jobs/upload-excel-async");
    let parsed = read_multipart(multipart).await?;
    let payload = WorkbookIngestPayload {
        workbook_hex: parsed.workbook_hex,
        parse_method: parsed.parse_method,
        portfolio_date: parsed.portfolio_date,
    };
    let payload_json = serde_json::to_value(&payload)
        .map_err(|e| AppError::Validation(format!("failed to encode job payload: {e}")))?;

    let job = state
        .scheduler
        .submit(
            JobKind::WorkbookIngest,
            payload_json,
            0,
            SubmitOptions {
                callback_url: parsed.callback_url,
                user_id: parsed.user_id,
            },
        )
        .await?;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        ok_envelope("job queued", serde_json::json!({"job_id": job.id, "status": job.status.as_str()})),
    ))
}
