use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::errors::AppError;
use crate::models::etf::{EtfHoldingsSnapshot, EtfMetadata, HoldingLine, HoldingsRepoStats};

/// §4.8. Thin typed wrapper over `etf_holdings_snapshots` and the
/// read-only `etf_metadata` discovery table, following the same queries
/// split as `PortfolioRepo`.
#[derive(Clone)]
pub struct HoldingsRepo {
    pool: PgPool,
}

fn row_to_snapshot(row: sqlx::postgres::PgRow) -> Result<EtfHoldingsSnapshot, sqlx::Error> {
    Ok(EtfHoldingsSnapshot {
        symbol: row.try_get("symbol")?,
        isin: row.try_get("isin")?,
        name: row.try_get("name")?,
        holdings: row.try_get::<Json<Vec<HoldingLine>>, _>("holdings")?.0,
        fetched_at: row.try_get("fetched_at")?,
        source_etag: row.try_get("source_etag")?,
    })
}

impl HoldingsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, snapshot: &EtfHoldingsSnapshot) -> Result<EtfHoldingsSnapshot, AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO etf_holdings_snapshots (symbol, isin, name, holdings, fetched_at, source_etag)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (symbol)
            DO UPDATE SET
                isin = EXCLUDED.isin,
                name = EXCLUDED.name,
                holdings = EXCLUDED.holdings,
                fetched_at = EXCLUDED.fetched_at,
                source_etag = EXCLUDED.source_etag
            RETURNING *
            "#,
        )
        .bind(&snapshot.symbol)
        .bind(&snapshot.isin)
        .bind(&snapshot.name)
        .bind(Json(&snapshot.holdings))
        .bind(snapshot.fetched_at)
        .bind(&snapshot.source_etag)
        .fetch_one(&self.pool)
        .await?;

        Ok(row_to_snapshot(row)?)
    }

    pub async fn get_by_symbol(&self, symbol: &str) -> Result<EtfHoldingsSnapshot, AppError> {
        let row = sqlx::query("SELECT * FROM etf_holdings_snapshots WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no holdings snapshot for {symbol}")))?;
        Ok(row_to_snapshot(row)?)
    }

    /// §4.7 freshness cache: is the stored snapshot newer than `ttl`?
    pub async fn fetched_within(&self, symbol: &str, ttl: chrono::Duration) -> Result<bool, AppError> {
        let fetched_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT fetched_at FROM etf_holdings_snapshots WHERE symbol = $1")
                .bind(symbol)
                .fetch_optional(&self.pool)
                .await?;
        Ok(matches!(fetched_at, Some(at) if Utc::now() - at < ttl))
    }

    pub async fn stats(&self) -> Result<HoldingsRepoStats, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS symbol_count,
                COALESCE(SUM(jsonb_array_length(holdings)), 0) AS total_holding_lines,
                MIN(fetched_at) AS oldest_fetched_at,
                MAX(fetched_at) AS newest_fetched_at
            FROM etf_holdings_snapshots
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(HoldingsRepoStats {
            symbol_count: row.try_get("symbol_count")?,
            total_holding_lines: row.try_get("total_holding_lines")?,
            oldest_fetched_at: row.try_get("oldest_fetched_at")?,
            newest_fetched_at: row.try_get("newest_fetched_at")?,
        })
    }

    /// Discovery step (§4.7): ETF metadata with a non-empty ISIN, ordered
    /// by symbol for deterministic re-runs of `fetch_holdings_all`.
    pub async fn discover_fetchable(&self, limit: Option<i64>) -> Result<Vec<EtfMetadata>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT symbol, isin, name, exchange FROM etf_metadata
            WHERE isin IS NOT NULL AND isin <> ''
            ORDER BY symbol ASC
            LIMIT $1
            "#,
        )
        .bind(limit.unwrap_or(100_000).clamp(1, 100_000))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(EtfMetadata {
                    symbol: r.try_get("symbol")?,
                    isin: r.try_get("isin")?,
                    name: r.try_get("name")?,
                    exchange: r.try_get("exchange")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(AppError::from)
    }

    pub async fn get_metadata(&self, symbol: &str) -> Result<EtfMetadata, AppError> {
        let row = sqlx::query("SELECT symbol, isin, name, exchange FROM etf_metadata WHERE symbol = $1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("unknown etf symbol {symbol}")))?;
        Ok(EtfMetadata {
            symbol: row.try_get("symbol")?,
            isin: row.try_get("isin")?,
            name: row.try_get("name")?,
            exchange: row.try_get("exchange")?,
        })
    }

    pub async fn search_metadata(&self, query: &str, limit: i64) -> Result<Vec<EtfMetadata>, AppError> {
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            r#"
            SELECT symbol, isin, name, exchange FROM etf_metadata
            WHERE name ILIKE $1 OR symbol ILIKE $1
            ORDER BY symbol ASC
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(EtfMetadata {
                    symbol: r.try_get("symbol")?,
                    isin: r.try_get("isin")?,
                    name: r.try_get("name")?,
                    exchange: r.try_get("exchange")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(AppError::from)
    }
}
