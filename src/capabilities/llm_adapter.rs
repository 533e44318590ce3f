use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::sheet_decoder::TabularBlock;
use crate::models::portfolio::PortfolioHolding;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmPortfolioExtract {
    pub mutual_fund_name: String,
    pub portfolio_date: String,
    pub holdings: Vec<PortfolioHolding>,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm adapter unavailable: {0}")]
    Unavailable(String),
    #[error("llm response failed schema validation: {0}")]
    SchemaInvalid(String),
    #[error("llm transport error: {0}")]
    Transport(String),
}

/// §6: the LLM adapter is a capability interface — this crate only defines
/// what it needs from one (a tabular block in, a schema-validated
/// portfolio extract out) and calls it through `dyn LlmAdapter`, mirroring
/// how the reference backend's `PriceProvider` trait keeps price-source
/// specifics (Twelve Data vs. Alpha Vantage vs. Yahoo) out of the services
/// that consume prices.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn extract_portfolio(
        &self,
        block: &TabularBlock,
    ) -> Result<LlmPortfolioExtract, LlmError>;

    /// Whether an extraction failure on this adapter should fall back to
    /// the manual parser (§4.6: "On validation failure, fall back to
    /// manual if the adapter so indicates").
    fn should_fallback_on_error(&self, _error: &LlmError) -> bool {
        true
    }
}

/// Default HTTP-backed adapter, shaped like the reference backend's
/// `external::twelvedata`/`external::yahoofinance` clients: a thin
/// `reqwest` wrapper with a per-call timeout and a provider-specific
/// payload, translated into this crate's own result type at the edge.
pub struct HttpLlmAdapter {
    client: reqwest::Client,
    provider: String,
    api_key: String,
    endpoint: String,
}

impl HttpLlmAdapter {
    pub fn new(provider: String, api_key: String, endpoint: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");
        Self {
            client,
            provider,
            api_key,
            endpoint,
        }
    }
}

#[derive(Serialize)]
struct LlmRequest<'a> {
    provider: &'a str,
    sheet_name: &'a str,
    headers: &'a [String],
    rows: &'a [Vec<String>],
    response_schema: &'static str,
}

const PORTFOLIO_SCHEMA: &str = r#"{
    "type": "object",
    "required": ["mutual_fund_name", "portfolio_date", "holdings"],
    "properties": {
        "mutual_fund_name": {"type": "string"},
        "portfolio_date": {"type": "string"},
        "holdings": {
            "type": "array",
            "items": {
                "type": "object",
                "required": ["name_of_instrument", "isin_code", "percentage_to_nav"],
                "properties": {
                    "name_of_instrument": {"type": "string"},
                    "isin_code": {"type": "string"},
                    "percentage_to_nav": {"type": "string"}
                }
            }
        }
    }
}"#;

#[async_trait]
impl LlmAdapter for HttpLlmAdapter {
    async fn extract_portfolio(
        &self,
        block: &TabularBlock,
    ) -> Result<LlmPortfolioExtract, LlmError> {
        let request = LlmRequest {
            provider: &self.provider,
            sheet_name: &block.sheet_name,
            headers: &block.headers,
            rows: &block.rows,
            response_schema: PORTFOLIO_SCHEMA,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Transport(format!(
                "llm provider returned {}",
                response.status()
            )));
        }

        response
            .json::<LlmPortfolioExtract>()
            .await
            .map_err(|e| LlmError::SchemaInvalid(e.to_string()))
    }
}
