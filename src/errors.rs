use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Transport-facing error. Distinct from `JobErrorKind` (`models::job`),
/// which tags failures recorded *inside* a job document rather than ones
/// that abort an HTTP request before a job subsystem operation runs.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("job cannot be cancelled: {0}")]
    NotCancellable(String),
    #[error("external error: {0}")]
    External(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::StoreUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::NotCancellable(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::External(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
        };
        (
            code,
            Json(ErrorBody {
                status: "error",
                message,
            }),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => AppError::NotFound("record not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(db_err.message().to_string())
            }
            other => AppError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}

/// Standard envelope for successful JSON responses: `{status, message, data?}`.
pub fn ok_envelope<T: Serialize>(message: &str, data: T) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": message,
        "data": data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn each_variant_maps_to_its_documented_status() {
        assert_eq!(status_of(AppError::Validation("x".into())), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_of(AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(AppError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(AppError::StoreUnavailable("x".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(AppError::NotCancellable("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(AppError::External("x".into())), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
