use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::jobs::store::JobStore;
use crate::models::job::Job;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// §4.5. Best-effort outbound notification on terminal transition. Backoff
/// shape (`base * 2^attempt`, capped) mirrors the exponential-backoff retry
/// scheduling this pack's Postgres job-queue reference
/// (`seesaw-job-postgres::mark_failed`) already uses for its own retries.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: Client,
}

impl WebhookDispatcher {
    pub fn new(total_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(total_timeout)
            .build()
            .expect("reqwest client builds");
        Self { client }
    }

    pub fn backoff_delay(attempt: u32) -> Duration {
        let scaled = BASE_DELAY.saturating_mul(2u32.saturating_pow(attempt));
        std::cmp::min(scaled, MAX_DELAY)
    }

    /// Dispatches on a detached task so a slow/unreachable callback never
    /// blocks the worker that just finished — the scheduler is free to pick
    /// up the next job immediately.
    pub fn dispatch_if_needed(&self, store: JobStore, job: Job) {
        let Some(url) = job.callback_url.clone() else {
            return;
        };
        let this = self.clone();
        tokio::spawn(async move {
            this.deliver(store, job, url).await;
        });
    }

    async fn deliver(&self, store: JobStore, job: Job, url: String) {
        let body = json!({
            "job_id": job.id,
            "status": job.status.as_str(),
            "result": job.result,
            "error": job.error,
            "finished_at": job.completed_at,
        });

        for attempt in 0..MAX_ATTEMPTS {
            match self.client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(job_id = %job.id, "webhook delivered");
                    return;
                }
                Ok(resp) => {
                    warn!(job_id = %job.id, status = %resp.status(), attempt, "webhook non-2xx");
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, attempt, "webhook delivery failed");
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Self::backoff_delay(attempt)).await;
            }
        }

        let _ = store
            .record_webhook_error(job.id, "webhook delivery exhausted retries")
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(WebhookDispatcher::backoff_delay(0), BASE_DELAY);
        assert_eq!(WebhookDispatcher::backoff_delay(1), BASE_DELAY * 2);
        assert_eq!(WebhookDispatcher::backoff_delay(2), BASE_DELAY * 4);
        assert_eq!(WebhookDispatcher::backoff_delay(10), MAX_DELAY);
    }
}
