use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::capabilities::upstream_client::EtfHoldingsClient;
use crate::jobs::registry::{HandlerOutcome, JobContext, JobHandler};
use crate::models::etf::EtfHoldingsSnapshot;
use crate::models::job::{JobError, JobErrorKind, Progress};
use crate::rate_limiter::RateLimiter;
use crate::repos::holdings_repo::HoldingsRepo;

#[derive(Debug, Deserialize)]
pub struct FetchHoldingsOnePayload {
    pub symbol: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct FetchHoldingsAllPayload {
    pub limit: Option<i64>,
}

enum SymbolOutcome {
    CacheHit,
    Fetched,
    Failed(String),
}

/// §4.7. Shared per-symbol fetch-or-cache step used by both sub-kinds: the
/// freshness check, the rate-gated upstream call, and the snapshot upsert.
/// Every upstream call funnels through the single `RateLimiter` instance
/// held in `AppState`, regardless of which job or worker is running.
async fn fetch_one_symbol(
    repo: &HoldingsRepo,
    client: &Arc<dyn EtfHoldingsClient>,
    rate_limiter: &Arc<RateLimiter>,
    freshness_ttl: chrono::Duration,
    symbol: &str,
) -> SymbolOutcome {
    match repo.fetched_within(symbol, freshness_ttl).await {
        Ok(true) => return SymbolOutcome::CacheHit,
        Ok(false) => {}
        Err(e) => return SymbolOutcome::Failed(e.to_string()),
    }

    let metadata = match repo.get_metadata(symbol).await {
        Ok(m) => m,
        Err(e) => return SymbolOutcome::Failed(e.to_string()),
    };

    let _permit = rate_limiter.acquire().await;
    let response = match client.fetch_holdings(symbol).await {
        Ok(r) => r,
        Err(e) => return SymbolOutcome::Failed(e.to_string()),
    };

    let snapshot = EtfHoldingsSnapshot {
        symbol: symbol.to_string(),
        isin: metadata.isin,
        name: response.name,
        holdings: response.holdings,
        fetched_at: Utc::now(),
        source_etag: response.etag,
    };

    match repo.upsert(&snapshot).await {
        Ok(_) => SymbolOutcome::Fetched,
        Err(e) => SymbolOutcome::Failed(e.to_string()),
    }
}

pub struct FetchHoldingsOneHandler {
    repo: HoldingsRepo,
    client: Arc<dyn EtfHoldingsClient>,
    rate_limiter: Arc<RateLimiter>,
    freshness_ttl: chrono::Duration,
}

impl FetchHoldingsOneHandler {
    pub fn new(
        repo: HoldingsRepo,
        client: Arc<dyn EtfHoldingsClient>,
        rate_limiter: Arc<RateLimiter>,
        freshness_ttl: chrono::Duration,
    ) -> Self {
        Self {
            repo,
            client,
            rate_limiter,
            freshness_ttl,
        }
    }
}

#[async_trait]
impl JobHandler for FetchHoldingsOneHandler {
    async fn run(&self, payload: Value, ctx: JobContext) -> HandlerOutcome {
        let payload: FetchHoldingsOnePayload = match serde_json::from_value(payload) {
            Ok(p) => p,
            Err(e) => {
                return HandlerOutcome::Failed(JobError::new(
                    JobErrorKind::Validation,
                    format!("invalid fetch_holdings_one payload: {e}"),
                ))
            }
        };

        let mut progress = Progress::new(1);
        progress.current_item = Some(payload.symbol.clone());
        ctx.progress(progress.clone());

        if ctx.is_cancelled() {
            return HandlerOutcome::Cancelled;
        }

        let outcome = fetch_one_symbol(
            &self.repo,
            &self.client,
            &self.rate_limiter,
            self.freshness_ttl,
            &payload.symbol,
        )
        .await;

        match outcome {
            SymbolOutcome::CacheHit => {
                progress.completed = 1;
                progress.recompute_percentage();
                ctx.progress(progress);
                HandlerOutcome::Completed(json!({"symbol": payload.symbol, "cache_hit": true}))
            }
            SymbolOutcome::Fetched => {
                progress.completed = 1;
                progress.recompute_percentage();
                ctx.progress(progress);
                HandlerOutcome::Completed(json!({"symbol": payload.symbol, "cache_hit": false}))
            }
            SymbolOutcome::Failed(message) => {
                progress.failed = 1;
                progress.recompute_percentage();
                ctx.progress(progress);
                HandlerOutcome::Failed(JobError::new(JobErrorKind::UpstreamTotalFailure, message))
            }
        }
    }
}

pub struct FetchHoldingsAllHandler {
    repo: HoldingsRepo,
    client: Arc<dyn EtfHoldingsClient>,
    rate_limiter: Arc<RateLimiter>,
    freshness_ttl: chrono::Duration,
}

impl FetchHoldingsAllHandler {
    pub fn new(
        repo: HoldingsRepo,
        client: Arc<dyn EtfHoldingsClient>,
        rate_limiter: Arc<RateLimiter>,
        freshness_ttl: chrono::Duration,
    ) -> Self {
        Self {
            repo,
            client,
            rate_limiter,
            freshness_ttl,
        }
    }
}

#[async_trait]
impl JobHandler for FetchHoldingsAllHandler {
    async fn run(&self, payload: Value, ctx: JobContext) -> HandlerOutcome {
        let payload: FetchHoldingsAllPayload = serde_json::from_value(payload).unwrap_or_default();

        let symbols = match self.repo.discover_fetchable(payload.limit).await {
            Ok(s) => s,
            Err(e) => {
                return HandlerOutcome::Failed(JobError::new(JobErrorKind::StoreUnavailable, e.to_string()))
            }
        };

        if symbols.is_empty() {
            return HandlerOutcome::Failed(JobError::new(
                JobErrorKind::UpstreamTotalFailure,
                "no ETF metadata with a usable ISIN to fetch",
            ));
        }

        let total = symbols.len() as u32;
        let mut progress = Progress::new(total);
        let mut per_symbol = Vec::with_capacity(symbols.len());

        for meta in &symbols {
            if ctx.is_cancelled() {
                return HandlerOutcome::Cancelled;
            }

            progress.current_item = Some(meta.symbol.clone());
            ctx.progress(progress.clone());

            let outcome = fetch_one_symbol(
                &self.repo,
                &self.client,
                &self.rate_limiter,
                self.freshness_ttl,
                &meta.symbol,
            )
            .await;

            match outcome {
                SymbolOutcome::CacheHit => {
                    progress.completed += 1;
                    per_symbol.push(json!({"symbol": meta.symbol, "cache_hit": true}));
                }
                SymbolOutcome::Fetched => {
                    progress.completed += 1;
                    per_symbol.push(json!({"symbol": meta.symbol, "cache_hit": false}));
                }
                SymbolOutcome::Failed(message) => {
                    progress.failed += 1;
                    warn!(symbol = %meta.symbol, error = %message, "holdings fetch failed for symbol");
                    per_symbol.push(json!({"symbol": meta.symbol, "error": message}));
                }
            }
            progress.recompute_percentage();
            ctx.progress(progress.clone());
        }

        if progress.completed == 0 {
            return HandlerOutcome::Failed(JobError::new(
                JobErrorKind::UpstreamTotalFailure,
                "every symbol in this run failed",
            ));
        }

        HandlerOutcome::Completed(json!({
            "fetched": progress.completed,
            "failed": progress.failed,
            "symbols": per_symbol,
        }))
    }
}
