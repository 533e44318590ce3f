use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only to this crate (§3): the core never writes this collection.
/// Selected by the discovery step of the holdings fetcher (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtfMetadata {
    pub symbol: String,
    pub isin: Option<String>,
    pub name: String,
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HoldingLine {
    pub stock_name: String,
    pub isin_code: String,
    pub percentage: String,
    pub market_value: Option<String>,
    pub quantity: Option<String>,
}

/// §3 ETF holdings snapshot, keyed by symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtfHoldingsSnapshot {
    pub symbol: String,
    pub isin: Option<String>,
    pub name: String,
    pub holdings: Vec<HoldingLine>,
    pub fetched_at: DateTime<Utc>,
    pub source_etag: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldingsRepoStats {
    pub symbol_count: i64,
    pub total_holding_lines: i64,
    pub oldest_fetched_at: Option<DateTime<Utc>>,
    pub newest_fetched_at: Option<DateTime<Utc>>,
}
