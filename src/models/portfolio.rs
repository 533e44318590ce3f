use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of a fund statement. `percentage_to_nav` stays stringly typed
/// (per §3) to preserve whatever precision/units the source sheet used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioHolding {
    pub name_of_instrument: String,
    pub isin_code: String,
    pub percentage_to_nav: String,
}

/// §3 Portfolio. `id` equals the sheet identity (§4.6) for workbook-ingested
/// portfolios, or a caller-supplied id for directly-POSTed portfolios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: String,
    pub mutual_fund_name: String,
    pub portfolio_date: String,
    pub total_holdings: i32,
    pub portfolio_holdings: Vec<PortfolioHolding>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Portfolio {
    /// Builds a portfolio ready for first insert; `created_at`/`updated_at`
    /// are assigned by the repository so upserts can tell first-write from
    /// update (§4.8).
    pub fn assemble(
        id: String,
        mutual_fund_name: String,
        portfolio_date: String,
        portfolio_holdings: Vec<PortfolioHolding>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            mutual_fund_name,
            portfolio_date,
            total_holdings: portfolio_holdings.len() as i32,
            portfolio_holdings,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Body of `POST /portfolios`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePortfolio {
    pub id: Option<String>,
    pub mutual_fund_name: String,
    pub portfolio_date: String,
    pub portfolio_holdings: Vec<PortfolioHolding>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioListFilter {
    pub fund_name: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FundStatistics {
    pub mutual_fund_name: String,
    pub statement_count: i64,
    pub average_holdings: f64,
    pub distinct_isin_count: i64,
    pub latest_portfolio_date: Option<String>,
}

/// One cross-portfolio hit for `GET /holdings/{isin}`.
#[derive(Debug, Clone, Serialize)]
pub struct IsinHolding {
    pub portfolio_id: String,
    pub mutual_fund_name: String,
    pub portfolio_date: String,
    pub name_of_instrument: String,
    pub percentage_to_nav: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_derives_total_holdings_from_the_holdings_vec() {
        let holdings = vec![
            PortfolioHolding {
                name_of_instrument: "HDFC Bank".to_string(),
                isin_code: "INE040A01034".to_string(),
                percentage_to_nav: "8.5".to_string(),
            },
            PortfolioHolding {
                name_of_instrument: "Infosys".to_string(),
                isin_code: "INE009A01021".to_string(),
                percentage_to_nav: "6.2".to_string(),
            },
        ];
        let portfolio = Portfolio::assemble(
            "sid123".to_string(),
            "YO01".to_string(),
            "2026-03-31".to_string(),
            holdings,
        );
        assert_eq!(portfolio.total_holdings, 2);
        assert_eq!(portfolio.created_at, portfolio.updated_at);
    }
}
