use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// §3 Job.kind. New handlers register a new variant and a matching
/// `JobHandler` in the registry (§4.3); nothing else in the scheduler or
/// store needs to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    WorkbookIngest,
    FetchHoldingsOne,
    FetchHoldingsAll,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::WorkbookIngest => "workbook_ingest",
            JobKind::FetchHoldingsOne => "fetch_holdings_one",
            JobKind::FetchHoldingsAll => "fetch_holdings_all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "workbook_ingest" => Some(JobKind::WorkbookIngest),
            "fetch_holdings_one" => Some(JobKind::FetchHoldingsOne),
            "fetch_holdings_all" => Some(JobKind::FetchHoldingsAll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// §7 taxonomy, carried on `Job.error.kind`. Distinct from the
/// transport-facing `errors::AppError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    Validation,
    NotFound,
    Conflict,
    StoreUnavailable,
    UpstreamTimeout,
    UpstreamHttp,
    UpstreamParse,
    ParseSheet,
    ParseTotalFailure,
    UpstreamTotalFailure,
    Cancelled,
    LeaseLost,
    ManualOverride,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// §3 Job.progress. `percentage` must be nondecreasing within a single
/// `running` episode (invariant checked in `jobs::store`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub current_item: Option<String>,
    pub percentage: f32,
}

impl Progress {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            current_item: None,
            percentage: 0.0,
        }
    }

    pub fn recompute_percentage(&mut self) {
        if self.total == 0 {
            self.percentage = 100.0;
        } else {
            self.percentage =
                100.0 * (self.completed + self.failed) as f32 / self.total as f32;
        }
    }
}

/// Input accepted by `Scheduler::submit`.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    pub callback_url: Option<String>,
    pub user_id: Option<String>,
}

/// §3 Job, as stored and returned over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub payload: Value,
    pub status: JobStatus,
    pub progress: Progress,
    pub result: Option<Value>,
    pub error: Option<JobError>,
    pub attempts: i32,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub callback_url: Option<String>,
    pub user_id: Option<String>,
    pub cancel_requested: bool,
    pub webhook_error: Option<String>,
}

/// Filter accepted by `GET /jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListFilter {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kind_round_trips_through_its_wire_string() {
        for kind in [JobKind::WorkbookIngest, JobKind::FetchHoldingsOne, JobKind::FetchHoldingsAll] {
            assert_eq!(JobKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(JobKind::parse("not_a_kind"), None);
    }

    #[test]
    fn job_status_is_terminal_matches_the_taxonomy() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn progress_percentage_tracks_completed_and_failed() {
        let mut p = Progress::new(4);
        p.completed = 1;
        p.failed = 1;
        p.recompute_percentage();
        assert_eq!(p.percentage, 50.0);
    }

    #[test]
    fn progress_percentage_is_full_when_total_is_zero() {
        let mut p = Progress::new(0);
        p.recompute_percentage();
        assert_eq!(p.percentage, 100.0);
    }
}
