//! Document repositories (§4.8): typed wrappers over the Postgres tables
//! backing portfolios and ETF holdings snapshots.

pub mod holdings_repo;
pub mod portfolio_repo;
