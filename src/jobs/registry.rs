use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::job::{JobError, JobKind, Progress};

/// §4.3 context handed to every `JobHandler::run` call. Handlers never talk
/// to the Job Store directly; they observe cancellation and emit progress
/// through here, the same separation the reference backend keeps between
/// its `PriceProvider` trait objects and the repositories that persist
/// what they fetch.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    cancelled: watch::Receiver<bool>,
    progress_tx: tokio::sync::mpsc::UnboundedSender<Progress>,
}

impl JobContext {
    pub fn new(
        job_id: Uuid,
        cancelled: watch::Receiver<bool>,
        progress_tx: tokio::sync::mpsc::UnboundedSender<Progress>,
    ) -> Self {
        Self {
            job_id,
            cancelled,
            progress_tx,
        }
    }

    /// Checked at every yield point named in §5: before each sheet/symbol
    /// iteration, at every network call, and between emitting progress and
    /// starting the next work unit.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Coalescing is performed by the scheduler's progress-writer task
    /// (§4.3: "may throttle to <= 1 Hz"); handlers just emit every step.
    pub fn progress(&self, progress: Progress) {
        let _ = self.progress_tx.send(progress);
    }

    pub fn logger(&self) -> tracing::Span {
        tracing::info_span!("job", job_id = %self.job_id)
    }
}

/// Outcome of a handler run. `result` is kind-specific JSON; per-item
/// failures must already be folded into it by the handler (§4.6/§4.7
/// "completes if >= 1 item succeeded").
pub enum HandlerOutcome {
    Completed(Value),
    Failed(JobError),
    Cancelled,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, payload: Value, ctx: JobContext) -> HandlerOutcome;
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: JobKind, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<JobKind> {
        self.handlers.keys().copied().collect()
    }
}
