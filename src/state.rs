use std::sync::Arc;

use sqlx::PgPool;

use crate::capabilities::sheet_decoder::SheetDecoder;
use crate::handlers::workbook_ingest::WorkbookIngestHandler;
use crate::jobs::recovery::Recovery;
use crate::jobs::scheduler::Scheduler;
use crate::rate_limiter::RateLimiter;
use crate::repos::holdings_repo::HoldingsRepo;
use crate::repos::portfolio_repo::PortfolioRepo;

/// Everything a route handler needs, assembled once in `main` the way the
/// reference backend builds its own `AppState` around a pool and a
/// provider. Routes never construct repos or reach for the pool directly
/// for anything the job subsystem owns.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub scheduler: Arc<Scheduler>,
    pub recovery: Recovery,
    pub portfolio_repo: PortfolioRepo,
    pub holdings_repo: HoldingsRepo,
    pub sheet_decoder: Arc<dyn SheetDecoder>,
    pub upstream_rate_limiter: Arc<RateLimiter>,
    /// Held directly (in addition to living in the `HandlerRegistry`) so
    /// `POST /upload/excel` can run the same pipeline synchronously,
    /// without submitting a job for it (§6: "retained for small inputs").
    pub workbook_ingest: Arc<WorkbookIngestHandler>,
}
