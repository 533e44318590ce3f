use async_trait::async_trait;
use thiserror::Error;

use crate::models::etf::HoldingLine;

#[derive(Debug, Error, Clone)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("failed to parse upstream response: {0}")]
    Parse(String),
}

impl UpstreamError {
    /// §4.7: "4xx from upstream -> non-retryable per-symbol failure".
    pub fn is_client_error(&self) -> bool {
        matches!(self, UpstreamError::Http { status, .. } if (400..500).contains(status))
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamHoldingsResponse {
    pub name: String,
    pub holdings: Vec<HoldingLine>,
    pub etag: Option<String>,
}

/// §4.7/§6: the upstream ETF-holdings data source is an external
/// collaborator; this crate only needs "fetch holdings for a symbol",
/// expressed as a trait object the same way `external::price_provider`
/// keeps the reference backend's price sources interchangeable.
#[async_trait]
pub trait EtfHoldingsClient: Send + Sync {
    async fn fetch_holdings(&self, symbol: &str) -> Result<UpstreamHoldingsResponse, UpstreamError>;
}

/// Default HTTP client, shaped like the reference backend's
/// `external::multi_provider`: a single `reqwest::Client` with a per-call
/// timeout, mapping transport/HTTP-status failures onto this crate's
/// `UpstreamError` taxonomy at the edge so callers never see `reqwest`
/// types directly.
pub struct HttpEtfHoldingsClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEtfHoldingsClient {
    pub fn new(base_url: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");
        Self { client, base_url }
    }
}

#[derive(serde::Deserialize)]
struct UpstreamPayload {
    name: String,
    holdings: Vec<HoldingLine>,
}

#[async_trait]
impl EtfHoldingsClient for HttpEtfHoldingsClient {
    async fn fetch_holdings(&self, symbol: &str) -> Result<UpstreamHoldingsResponse, UpstreamError> {
        let url = format!("{}/etf/{}/holdings", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let payload: UpstreamPayload = response
            .json()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))?;

        Ok(UpstreamHoldingsResponse {
            name: payload.name,
            holdings: payload.holdings,
            etag,
        })
    }
}
