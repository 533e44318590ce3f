use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::job::{Job, JobError, JobKind, JobListFilter, JobStatus, Progress, SubmitOptions};

/// Raw row shape; `kind`/`status` are columns as plain `TEXT` (teacher's
/// `db::portfolio_queries` prefers runtime-bound queries over the `query!`
/// macro, so this store follows suit rather than adding a custom
/// `sqlx::Type` for each enum).
struct JobRow {
    id: Uuid,
    kind: String,
    payload: Json<Value>,
    status: String,
    progress: Json<Progress>,
    result: Option<Json<Value>>,
    error: Option<Json<JobError>>,
    attempts: i32,
    worker_id: Option<String>,
    lease_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    callback_url: Option<String>,
    user_id: Option<String>,
    cancel_requested: bool,
    webhook_error: Option<String>,
}

impl JobRow {
    fn from_row(row: sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            kind: row.try_get("kind")?,
            payload: row.try_get("payload")?,
            status: row.try_get("status")?,
            progress: row.try_get("progress")?,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            attempts: row.try_get("attempts")?,
            worker_id: row.try_get("worker_id")?,
            lease_expires_at: row.try_get("lease_expires_at")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            callback_url: row.try_get("callback_url")?,
            user_id: row.try_get("user_id")?,
            cancel_requested: row.try_get("cancel_requested")?,
            webhook_error: row.try_get("webhook_error")?,
        })
    }

    fn into_job(self) -> Job {
        Job {
            id: self.id,
            kind: JobKind::parse(&self.kind).unwrap_or(JobKind::WorkbookIngest),
            payload: self.payload.0,
            status: JobStatus::parse(&self.status).unwrap_or(JobStatus::Queued),
            progress: self.progress.0,
            result: self.result.map(|j| j.0),
            error: self.error.map(|j| j.0),
            attempts: self.attempts,
            worker_id: self.worker_id,
            lease_expires_at: self.lease_expires_at,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            callback_url: self.callback_url,
            user_id: self.user_id,
            cancel_requested: self.cancel_requested,
            webhook_error: self.webhook_error,
        }
    }
}

/// Terminal transition payload for `finalize` (§4.1, §4.2).
pub enum Terminal {
    Completed(Value),
    Failed(JobError),
    Cancelled,
}

#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert(
        &self,
        kind: JobKind,
        payload: Value,
        total_items: u32,
        opts: SubmitOptions,
    ) -> Result<Job, AppError> {
        let id = Uuid::new_v4();
        let progress = Progress::new(total_items);
        let row = sqlx::query(
            r#"
            INSERT INTO jobs
                (id, kind, payload, status, progress, attempts, callback_url, user_id, cancel_requested)
            VALUES
                ($1, $2, $3, 'queued', $4, 0, $5, $6, FALSE)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(Json(payload))
        .bind(Json(progress))
        .bind(opts.callback_url)
        .bind(opts.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(JobRow::from_row(row)?.into_job())
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Job, AppError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;
        Ok(JobRow::from_row(row)?.into_job())
    }

    pub async fn list(&self, filter: JobListFilter) -> Result<Vec<Job>, AppError> {
        let limit = filter.limit.unwrap_or(100).clamp(1, 1000);
        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR kind = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(filter.status)
        .bind(filter.kind)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| Ok(JobRow::from_row(r)?.into_job()))
            .collect()
    }

    /// §4.2 `claim_one`: an atomic compare-and-set moving a `queued` row, or
    /// a `running` row whose lease has expired, to `running` under the
    /// caller's `worker_id`. The `FOR UPDATE SKIP LOCKED` CTE shape mirrors
    /// the claim query in the Postgres job-queue reference in this pack
    /// (`seesaw-job-postgres`'s `claim_ready`), narrowed to a single row per
    /// call since the scheduler here claims one job per free worker permit.
    pub async fn claim_one(
        &self,
        kinds: &[JobKind],
        worker_id: &str,
        lease_ttl: chrono::Duration,
    ) -> Result<Option<Job>, AppError> {
        let now = Utc::now();
        let lease_expires_at = now + lease_ttl;
        let kind_strs: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();

        let row = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id FROM jobs
                WHERE kind = ANY($1)
                  AND (status = 'queued' OR (status = 'running' AND lease_expires_at < $2))
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                worker_id = $3,
                lease_expires_at = $4,
                started_at = COALESCE(started_at, $2),
                attempts = attempts + 1
            WHERE id IN (SELECT id FROM claimable)
            RETURNING *
            "#,
        )
        .bind(&kind_strs)
        .bind(now)
        .bind(worker_id)
        .bind(lease_expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| JobRow::from_row(r)).transpose()?.map(|r| r.into_job()))
    }

    pub async fn heartbeat(
        &self,
        job_id: Uuid,
        worker_id: &str,
        lease_ttl: chrono::Duration,
    ) -> Result<bool, AppError> {
        let new_lease = Utc::now() + lease_ttl;
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = $1
            WHERE id = $2 AND worker_id = $3 AND status = 'running'
            "#,
        )
        .bind(new_lease)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Progress is clamped to be nondecreasing within the running episode
    /// (§3 invariant) by always writing the handler's latest snapshot —
    /// handlers only ever advance `completed`/`failed` forward, never reset
    /// them mid-run.
    pub async fn update_progress(
        &self,
        job_id: Uuid,
        worker_id: &str,
        progress: Progress,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET progress = $1
            WHERE id = $2 AND worker_id = $3 AND status = 'running'
            "#,
        )
        .bind(Json(progress))
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// §4.2 `finalize`: write-once terminal transition. No-ops (returns
    /// `false`) if the job is already terminal or owned by someone else,
    /// rather than erroring, since a handler racing with Recovery can
    /// legitimately lose this race.
    pub async fn finalize(
        &self,
        job_id: Uuid,
        worker_id: &str,
        terminal: Terminal,
    ) -> Result<bool, AppError> {
        let (status, result, error) = match terminal {
            Terminal::Completed(v) => ("completed", Some(Json(v)), None),
            Terminal::Failed(e) => ("failed", None, Some(Json(e))),
            Terminal::Cancelled => ("cancelled", None, None),
        };

        let outcome = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1,
                result = $2,
                error = $3,
                completed_at = NOW()
            WHERE id = $4 AND worker_id = $5 AND status = 'running'
            "#,
        )
        .bind(status)
        .bind(result)
        .bind(error)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(outcome.rows_affected() == 1)
    }

    pub async fn record_webhook_error(&self, job_id: Uuid, message: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE jobs SET webhook_error = $1 WHERE id = $2")
            .bind(message)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// §4.1 `Cancel`: sets the flag observed by running handlers. Terminal
    /// jobs are left untouched (cancellation of a job that already finished
    /// is simply not actionable).
    pub async fn request_cancel(&self, job_id: Uuid) -> Result<Job, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE jobs
            SET cancel_requested = TRUE
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(JobRow::from_row(r)?.into_job()),
            None => self.get(job_id).await,
        }
    }

    /// A `queued` job cancels instantly (§4.1); a `running` one only flips
    /// to `cancelled` once its handler observes `cancel_requested` and the
    /// scheduler calls `finalize`.
    pub async fn mark_cancelled_if_queued(&self, job_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled', completed_at = NOW()
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// §4.4 Recovery: every `running` job whose lease has expired.
    pub async fn list_stuck(&self, older_than: DateTime<Utc>) -> Result<Vec<Job>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM jobs
            WHERE status = 'running' AND lease_expires_at < $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| Ok(JobRow::from_row(r)?.into_job()))
            .collect()
    }

    /// Returns a `running` job to `queued`, clearing ownership so the
    /// scheduler can reclaim it (§4.4 startup/periodic sweep).
    pub async fn requeue_stuck(&self, job_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'queued', worker_id = NULL, lease_expires_at = NULL
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Operator override (§4.4): force a specific job to `queued` or
    /// `failed` regardless of lease state, recording `manual_override`.
    pub async fn force_override(&self, job_id: Uuid, to_failed: bool) -> Result<Job, AppError> {
        let row = if to_failed {
            let error = JobError::new(
                crate::models::job::JobErrorKind::ManualOverride,
                "forced to failed by operator",
            );
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed', error = $1, completed_at = NOW()
                WHERE id = $2
                RETURNING *
                "#,
            )
            .bind(Json(error))
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'queued', worker_id = NULL, lease_expires_at = NULL
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?
        };
        Ok(JobRow::from_row(row)?.into_job())
    }
}
