mod app;
mod capabilities;
mod config;
mod errors;
mod handlers;
mod jobs;
mod logging;
mod models;
mod rate_limiter;
mod repos;
mod routes;
mod state;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use crate::capabilities::sheet_decoder::UnimplementedSheetDecoder;
use crate::capabilities::upstream_client::HttpEtfHoldingsClient;
use crate::config::Config;
use crate::handlers::holdings_fetch::{FetchHoldingsAllHandler, FetchHoldingsOneHandler};
use crate::handlers::workbook_ingest::WorkbookIngestHandler;
use crate::jobs::recovery::Recovery;
use crate::jobs::registry::HandlerRegistry;
use crate::jobs::scheduler::Scheduler;
use crate::jobs::store::JobStore;
use crate::jobs::webhook::WebhookDispatcher;
use crate::logging::LoggingConfig;
use crate::models::job::JobKind;
use crate::rate_limiter::RateLimiter;
use crate::repos::holdings_repo::HoldingsRepo;
use crate::repos::portfolio_repo::PortfolioRepo;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    logging::init_logging(LoggingConfig::from_env())?;

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = JobStore::new(pool.clone());
    let portfolio_repo = PortfolioRepo::new(pool.clone());
    let holdings_repo = HoldingsRepo::new(pool.clone());

    let sheet_decoder: Arc<dyn capabilities::sheet_decoder::SheetDecoder> =
        Arc::new(UnimplementedSheetDecoder);
    let llm_adapter: Option<Arc<dyn capabilities::llm_adapter::LlmAdapter>> =
        match (&config.llm_provider, &config.llm_api_key) {
            (Some(provider), Some(api_key)) => {
                Some(Arc::new(capabilities::llm_adapter::HttpLlmAdapter::new(
                    provider.clone(),
                    api_key.clone(),
                    format!("https://api.{provider}.example/v1/extract"),
                    config.upstream_timeout,
                )))
            }
            _ => None,
        };
    let upstream_client: Arc<dyn capabilities::upstream_client::EtfHoldingsClient> = Arc::new(
        HttpEtfHoldingsClient::new("https://moneycontrol.example/api".to_string(), config.upstream_timeout),
    );

    // §4.7: a single rate gate shared by every upstream holdings call,
    // regardless of which job or worker issues it.
    let requests_per_minute = (60_000 / config.upstream_min_interval.as_millis().max(1)).max(1) as u32;
    let upstream_rate_limiter = Arc::new(RateLimiter::new(1, requests_per_minute));

    let workbook_ingest = Arc::new(WorkbookIngestHandler::new(
        sheet_decoder.clone(),
        llm_adapter,
        portfolio_repo.clone(),
        config.llm_sheet_concurrency,
    ));
    let fetch_holdings_one = Arc::new(FetchHoldingsOneHandler::new(
        holdings_repo.clone(),
        upstream_client.clone(),
        upstream_rate_limiter.clone(),
        chrono::Duration::from_std(config.freshness_ttl).unwrap(),
    ));
    let fetch_holdings_all = Arc::new(FetchHoldingsAllHandler::new(
        holdings_repo.clone(),
        upstream_client.clone(),
        upstream_rate_limiter.clone(),
        chrono::Duration::from_std(config.freshness_ttl).unwrap(),
    ));

    let mut registry = HandlerRegistry::new();
    registry.register(JobKind::WorkbookIngest, workbook_ingest.clone());
    registry.register(JobKind::FetchHoldingsOne, fetch_holdings_one);
    registry.register(JobKind::FetchHoldingsAll, fetch_holdings_all);

    let webhook = WebhookDispatcher::new(config.upstream_timeout);
    let scheduler = Scheduler::new(store.clone(), registry, webhook, &config);
    scheduler.spawn_workers();

    let recovery = Recovery::new(store.clone(), config.recovery_interval);
    recovery.clone().spawn();

    let state = AppState {
        pool,
        scheduler,
        recovery,
        portfolio_repo,
        holdings_repo,
        sheet_decoder,
        upstream_rate_limiter,
        workbook_ingest,
    };

    let app = app::create_app(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("fundflow-ingest listening on http://{}/", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
