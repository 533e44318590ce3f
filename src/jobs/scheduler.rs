use std::sync::Arc;
use std::time::Duration as StdDuration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::jobs::registry::{HandlerOutcome, HandlerRegistry, JobContext};
use crate::jobs::store::{JobStore, Terminal};
use crate::jobs::webhook::WebhookDispatcher;
use crate::models::job::{Job, JobKind, JobListFilter, Progress, SubmitOptions};

/// §4.1/§5: a bounded pool of worker tasks, each running a
/// claim -> dispatch -> heartbeat -> finalize loop. The pool size is the
/// only concurrency cap; everything else (the upstream rate gate, the
/// per-handler LLM fan-out) is owned by the handlers themselves.
pub struct Scheduler {
    store: JobStore,
    registry: HandlerRegistry,
    webhook: WebhookDispatcher,
    lease_ttl: chrono::Duration,
    heartbeat_interval: StdDuration,
    worker_concurrency: usize,
    /// One cancellation signal per in-flight job, keyed by job id. Populated
    /// when a worker claims a job, removed on finalize. `Cancel` flips this
    /// directly when the job is owned by this process (the common case for
    /// the single-process pool this spec describes) and also persists the
    /// request to the store so a future claimant (post lease-recovery)
    /// still observes it.
    cancel_signals: Arc<DashMap<Uuid, watch::Sender<bool>>>,
}

impl Scheduler {
    pub fn new(
        store: JobStore,
        registry: HandlerRegistry,
        webhook: WebhookDispatcher,
        config: &Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            webhook,
            lease_ttl: chrono::Duration::from_std(config.lease_ttl).unwrap(),
            heartbeat_interval: config.heartbeat_interval,
            worker_concurrency: config.worker_concurrency,
            cancel_signals: Arc::new(DashMap::new()),
        })
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Spawns the worker pool. Returns immediately; workers run for the
    /// lifetime of the process.
    pub fn spawn_workers(self: &Arc<Self>) {
        for idx in 0..self.worker_concurrency {
            let this = self.clone();
            let worker_id = format!("worker-{idx}-{}", Uuid::new_v4());
            tokio::spawn(async move {
                this.worker_loop(worker_id).await;
            });
        }
        info!(count = self.worker_concurrency, "scheduler worker pool started");
    }

    async fn worker_loop(self: Arc<Self>, worker_id: String) {
        let kinds = self.registry.kinds();
        loop {
            match self.store.claim_one(&kinds, &worker_id, self.lease_ttl).await {
                Ok(Some(job)) => {
                    self.run_job(worker_id.clone(), job).await;
                }
                Ok(None) => {
                    tokio::time::sleep(StdDuration::from_millis(500)).await;
                }
                Err(e) => {
                    error!(error = %e, "claim_one failed; backing off");
                    tokio::time::sleep(StdDuration::from_secs(2)).await;
                }
            }
        }
    }

    async fn run_job(self: &Arc<Self>, worker_id: String, job: Job) {
        let handler = match self.registry.get(job.kind) {
            Some(h) => h,
            None => {
                warn!(job_id = %job.id, kind = ?job.kind, "no handler registered for job kind");
                let _ = self
                    .store
                    .finalize(
                        job.id,
                        &worker_id,
                        Terminal::Failed(crate::models::job::JobError::new(
                            crate::models::job::JobErrorKind::Validation,
                            "no handler registered for this job kind",
                        )),
                    )
                    .await;
                return;
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(job.cancel_requested);
        self.cancel_signals.insert(job.id, cancel_tx);
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<Progress>();
        let ctx = JobContext::new(job.id, cancel_rx, progress_tx);

        // Heartbeat + cancellation-flag poll, alongside the handler.
        let hb_store = self.store.clone();
        let hb_job_id = job.id;
        let hb_worker_id = worker_id.clone();
        let hb_interval = self.heartbeat_interval;
        let hb_lease_ttl = self.lease_ttl;
        let cancel_signals = self.cancel_signals.clone();
        let heartbeat_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(hb_interval);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                if !hb_store
                    .heartbeat(hb_job_id, &hb_worker_id, hb_lease_ttl)
                    .await
                    .unwrap_or(false)
                {
                    break;
                }
                if let Ok(current) = hb_store.get(hb_job_id).await {
                    if current.cancel_requested {
                        if let Some(tx) = cancel_signals.get(&hb_job_id) {
                            let _ = tx.send(true);
                        }
                    }
                }
            }
        });

        // Progress writer: coalesces to the last snapshot seen per tick,
        // throttled to roughly 1 Hz as §4.3 allows.
        let progress_store = self.store.clone();
        let progress_job_id = job.id;
        let progress_worker_id = worker_id.clone();
        let progress_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_secs(1));
            let mut latest: Option<Progress> = None;
            loop {
                tokio::select! {
                    maybe = progress_rx.recv() => {
                        match maybe {
                            Some(p) => latest = Some(p),
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        if let Some(p) = latest.take() {
                            let _ = progress_store
                                .update_progress(progress_job_id, &progress_worker_id, p)
                                .await;
                        }
                    }
                }
            }
            if let Some(p) = latest {
                let _ = progress_store
                    .update_progress(progress_job_id, &progress_worker_id, p)
                    .await;
            }
        });

        let outcome = handler.run(job.payload.clone(), ctx).await;

        heartbeat_task.abort();
        self.cancel_signals.remove(&job.id);

        // `ctx` (and its sole `progress_tx`) was dropped when `handler.run`
        // returned, closing the channel; awaiting here (instead of
        // aborting) lets the writer drain whatever `latest` snapshot is
        // still pending and flush it before we finalize, so a job that
        // completes faster than the 1s ticker doesn't lose its last
        // progress update.
        let _ = progress_task.await;

        let terminal = match outcome {
            HandlerOutcome::Completed(result) => Terminal::Completed(result),
            HandlerOutcome::Failed(err) => Terminal::Failed(err),
            HandlerOutcome::Cancelled => Terminal::Cancelled,
        };

        match self.store.finalize(job.id, &worker_id, terminal).await {
            Ok(true) => {
                if let Ok(finalized) = self.store.get(job.id).await {
                    self.webhook.dispatch_if_needed(self.store.clone(), finalized);
                }
            }
            Ok(false) => {
                warn!(job_id = %job.id, "finalize no-op: lease already lost or job already terminal");
            }
            Err(e) => error!(job_id = %job.id, error = %e, "finalize failed"),
        }
    }

    // --- Scheduler contract (§4.1) ---

    pub async fn submit(
        &self,
        kind: JobKind,
        payload: Value,
        total_items: u32,
        opts: SubmitOptions,
    ) -> Result<Job, AppError> {
        self.store.insert(kind, payload, total_items, opts).await
    }

    pub async fn get(&self, job_id: Uuid) -> Result<Job, AppError> {
        self.store.get(job_id).await
    }

    pub async fn list(&self, filter: JobListFilter) -> Result<Vec<Job>, AppError> {
        self.store.list(filter).await
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<Job, AppError> {
        if self.store.mark_cancelled_if_queued(job_id).await? {
            return self.store.get(job_id).await;
        }
        let job = self.store.request_cancel(job_id).await?;
        if job.status.is_terminal() {
            return Err(AppError::NotCancellable(format!(
                "job {job_id} is already {}",
                job.status.as_str()
            )));
        }
        if let Some(tx) = self.cancel_signals.get(&job_id) {
            let _ = tx.send(true);
        }
        Ok(job)
    }
}
