use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::errors::AppError;
use crate::models::portfolio::{FundStatistics, IsinHolding, Portfolio, PortfolioHolding, PortfolioListFilter};

/// Thin typed wrapper over `portfolios`, mirroring the reference backend's
/// `db::portfolio_queries` split of "queries own SQL, services own
/// validation" — this repo is the queries half.
#[derive(Clone)]
pub struct PortfolioRepo {
    pool: PgPool,
}

fn row_to_portfolio(row: sqlx::postgres::PgRow) -> Result<Portfolio, sqlx::Error> {
    Ok(Portfolio {
        id: row.try_get("id")?,
        mutual_fund_name: row.try_get("mutual_fund_name")?,
        portfolio_date: row.try_get("portfolio_date")?,
        total_holdings: row.try_get("total_holdings")?,
        portfolio_holdings: row.try_get::<Json<Vec<PortfolioHolding>>, _>("portfolio_holdings")?.0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PortfolioRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// §4.8 upsert by natural key `(mutual_fund_name, portfolio_date)`.
    /// Preserves `created_at`; bumps `updated_at`. The unique index on the
    /// natural key is what makes this a single atomic statement rather than
    /// a select-then-branch. Returns whether this call performed the first
    /// insert (`xmax = 0` is the standard Postgres tell for "not touched by
    /// an `ON CONFLICT DO UPDATE` in this statement") so callers that need
    /// to distinguish create from update (e.g. HTTP status code) can.
    pub async fn upsert(&self, portfolio: &Portfolio) -> Result<(Portfolio, bool), AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO portfolios
                (id, mutual_fund_name, portfolio_date, total_holdings, portfolio_holdings, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (mutual_fund_name, portfolio_date)
            DO UPDATE SET
                total_holdings = EXCLUDED.total_holdings,
                portfolio_holdings = EXCLUDED.portfolio_holdings,
                updated_at = EXCLUDED.updated_at
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(&portfolio.id)
        .bind(&portfolio.mutual_fund_name)
        .bind(&portfolio.portfolio_date)
        .bind(portfolio.total_holdings)
        .bind(Json(&portfolio.portfolio_holdings))
        .bind(portfolio.created_at)
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = row.try_get("inserted")?;
        Ok((row_to_portfolio(row)?, inserted))
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Portfolio, AppError> {
        let row = sqlx::query("SELECT * FROM portfolios WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("portfolio {id} not found")))?;
        Ok(row_to_portfolio(row)?)
    }

    pub async fn get_by_natural_key(
        &self,
        fund_name: &str,
        portfolio_date: &str,
    ) -> Result<Option<Portfolio>, AppError> {
        let row = sqlx::query(
            "SELECT * FROM portfolios WHERE mutual_fund_name = $1 AND portfolio_date = $2",
        )
        .bind(fund_name)
        .bind(portfolio_date)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_portfolio).transpose().map_err(AppError::from)
    }

    pub async fn list(&self, filter: PortfolioListFilter) -> Result<Vec<Portfolio>, AppError> {
        let limit = filter.limit.unwrap_or(100).clamp(1, 1000);
        let rows = sqlx::query(
            r#"
            SELECT * FROM portfolios
            WHERE ($1::TEXT IS NULL OR mutual_fund_name = $1)
            ORDER BY updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(filter.fund_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_portfolio).collect::<Result<_, _>>().map_err(AppError::from)
    }

    pub async fn search_by_fund_name(&self, query: &str, limit: i64) -> Result<Vec<Portfolio>, AppError> {
        let pattern = format!("{query}%");
        let rows = sqlx::query(
            r#"
            SELECT * FROM portfolios
            WHERE mutual_fund_name ILIKE $1
            ORDER BY mutual_fund_name ASC
            LIMIT $2
            "#,
        )
        .bind(pattern)
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_portfolio).collect::<Result<_, _>>().map_err(AppError::from)
    }

    /// Cross-portfolio ISIN scan. `portfolio_holdings` is a JSONB array, so
    /// this walks it with `jsonb_array_elements` rather than joining a
    /// child table, backed by the GIN (`jsonb_path_ops`) index on that
    /// column named in the migration.
    pub async fn holdings_by_isin(&self, isin: &str) -> Result<Vec<IsinHolding>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT
                p.id AS portfolio_id,
                p.mutual_fund_name,
                p.portfolio_date,
                h.value ->> 'name_of_instrument' AS name_of_instrument,
                h.value ->> 'percentage_to_nav' AS percentage_to_nav
            FROM portfolios p, jsonb_array_elements(p.portfolio_holdings) AS h(value)
            WHERE h.value ->> 'isin_code' = $1
            ORDER BY p.portfolio_date DESC
            "#,
        )
        .bind(isin)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(IsinHolding {
                    portfolio_id: r.try_get("portfolio_id")?,
                    mutual_fund_name: r.try_get("mutual_fund_name")?,
                    portfolio_date: r.try_get("portfolio_date")?,
                    name_of_instrument: r.try_get("name_of_instrument")?,
                    percentage_to_nav: r.try_get("percentage_to_nav")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(AppError::from)
    }

    pub async fn fund_statistics(&self, fund_name: &str) -> Result<FundStatistics, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS statement_count,
                COALESCE(AVG(total_holdings), 0.0)::float8 AS average_holdings,
                COUNT(DISTINCT h.value ->> 'isin_code') AS distinct_isin_count,
                MAX(portfolio_date) AS latest_portfolio_date
            FROM portfolios p
            LEFT JOIN LATERAL jsonb_array_elements(p.portfolio_holdings) AS h(value) ON TRUE
            WHERE p.mutual_fund_name = $1
            "#,
        )
        .bind(fund_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(FundStatistics {
            mutual_fund_name: fund_name.to_string(),
            statement_count: row.try_get("statement_count")?,
            average_holdings: row.try_get("average_holdings")?,
            distinct_isin_count: row.try_get("distinct_isin_count")?,
            latest_portfolio_date: row.try_get("latest_portfolio_date")?,
        })
    }
}
