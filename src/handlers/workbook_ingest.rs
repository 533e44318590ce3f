use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tracing::warn;

use crate::capabilities::llm_adapter::LlmAdapter;
use crate::capabilities::sheet_decoder::{SheetDecoder, TabularBlock};
use crate::jobs::registry::{HandlerOutcome, JobContext, JobHandler};
use crate::models::job::{JobError, JobErrorKind, Progress};
use crate::models::portfolio::{Portfolio, PortfolioHolding};
use crate::repos::portfolio_repo::PortfolioRepo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbookIngestPayload {
    /// Hex-encoded workbook bytes (the job store persists JSON payloads,
    /// so raw bytes are hex-encoded the same way `sid` derivation uses
    /// `hex` rather than introducing a base64 dependency the rest of the
    /// crate has no other use for).
    pub workbook_hex: String,
    #[serde(default = "default_parse_method")]
    pub parse_method: String,
    /// All sheets in one workbook share a single statement date; the
    /// per-sheet natural key's fund name comes from the sheet name.
    pub portfolio_date: String,
}

fn default_parse_method() -> String {
    "manual".to_string()
}

#[derive(Debug, Serialize)]
struct SheetOutcome {
    sheet_name: String,
    portfolio_id: Option<String>,
    error: Option<String>,
}

/// §4.6. Decomposes a workbook into per-sheet tabular blocks, parses each
/// sheet (manual header-mapping or LLM-assisted), and upserts a Portfolio
/// per sheet keyed by its deterministic `sid`.
pub struct WorkbookIngestHandler {
    decoder: Arc<dyn SheetDecoder>,
    llm: Option<Arc<dyn LlmAdapter>>,
    repo: PortfolioRepo,
    llm_fanout: Arc<Semaphore>,
    sheet_concurrency: usize,
}

impl WorkbookIngestHandler {
    pub fn new(
        decoder: Arc<dyn SheetDecoder>,
        llm: Option<Arc<dyn LlmAdapter>>,
        repo: PortfolioRepo,
        llm_sheet_concurrency: usize,
    ) -> Self {
        let sheet_concurrency = llm_sheet_concurrency.max(1);
        Self {
            decoder,
            llm,
            repo,
            llm_fanout: Arc::new(Semaphore::new(sheet_concurrency)),
            sheet_concurrency,
        }
    }
}

/// §4.6 C0 addendum: `sid = hex(sha256(content_hash || 0x1F || sheet_index.be_bytes() || 0x1F || sheet_name))`,
/// truncated to 32 hex chars.
pub fn derive_sheet_identity(workbook_content_hash: &[u8], sheet_index: u32, sheet_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workbook_content_hash);
    hasher.update([0x1F]);
    hasher.update(sheet_index.to_be_bytes());
    hasher.update([0x1F]);
    hasher.update(sheet_name.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..32].to_string()
}

const HEADER_SYNONYMS: &[(&str, &str)] = &[
    ("name of instrument", "name_of_instrument"),
    ("instrument name", "name_of_instrument"),
    ("security name", "name_of_instrument"),
    ("stock name", "name_of_instrument"),
    ("isin", "isin_code"),
    ("isin code", "isin_code"),
    ("% to nav", "percentage_to_nav"),
    ("percentage to nav", "percentage_to_nav"),
    ("% to net assets", "percentage_to_nav"),
];

fn normalize_header(raw: &str) -> Option<&'static str> {
    let key = raw.trim().to_lowercase();
    HEADER_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, canonical)| *canonical)
}

/// §4.6 step 2, `manual` parser: maps headers through the synonym
/// dictionary, then extracts holdings row by row. A sheet with no
/// recognizable holdings table (missing both `isin_code` and
/// `name_of_instrument` columns) is a per-sheet error, not a job failure.
fn manual_parse(block: &TabularBlock) -> Result<Vec<PortfolioHolding>, String> {
    let mut columns: HashMap<&'static str, usize> = HashMap::new();
    for (idx, header) in block.headers.iter().enumerate() {
        if let Some(canonical) = normalize_header(header) {
            columns.entry(canonical).or_insert(idx);
        }
    }

    let name_idx = columns.get("name_of_instrument");
    let isin_idx = columns.get("isin_code");
    let (name_idx, isin_idx) = match (name_idx, isin_idx) {
        (Some(n), Some(i)) => (*n, *i),
        _ => return Err("no recognizable holdings table (missing name/ISIN columns)".to_string()),
    };
    let pct_idx = columns.get("percentage_to_nav").copied();

    let mut holdings = Vec::new();
    for row in &block.rows {
        let name = row.get(name_idx).cloned().unwrap_or_default();
        let isin = row.get(isin_idx).cloned().unwrap_or_default();
        if name.trim().is_empty() || isin.trim().is_empty() {
            continue;
        }
        let percentage = pct_idx
            .and_then(|i| row.get(i).cloned())
            .unwrap_or_default();
        holdings.push(PortfolioHolding {
            name_of_instrument: name,
            isin_code: isin,
            percentage_to_nav: percentage,
        });
    }

    if holdings.is_empty() {
        return Err("no holding rows extracted from sheet".to_string());
    }
    Ok(holdings)
}

/// Outcome of ingesting every sheet in one workbook, shared by the async
/// job handler and the synchronous `/upload/excel` route (§6) so both
/// entry points run exactly the same pipeline.
pub enum IngestOutcome {
    Completed(Value),
    Failed(JobError),
}

#[async_trait]
impl JobHandler for WorkbookIngestHandler {
    async fn run(&self, payload: Value, ctx: JobContext) -> HandlerOutcome {
        let payload: WorkbookIngestPayload = match serde_json::from_value(payload) {
            Ok(p) => p,
            Err(e) => {
                return HandlerOutcome::Failed(JobError::new(
                    JobErrorKind::Validation,
                    format!("invalid workbook_ingest payload: {e}"),
                ))
            }
        };

        match self
            .ingest_all_sheets(&payload, |p| ctx.progress(p), || ctx.is_cancelled())
            .await
        {
            IngestOutcome::Completed(v) => HandlerOutcome::Completed(v),
            IngestOutcome::Failed(e) if e.kind == JobErrorKind::Cancelled => HandlerOutcome::Cancelled,
            IngestOutcome::Failed(e) => HandlerOutcome::Failed(e),
        }
    }
}

impl WorkbookIngestHandler {
    /// The §4.6 pipeline body: decode, decompose, parse each sheet
    /// concurrently (bounded by `llm_sheet_concurrency`, the same knob that
    /// sizes the LLM fan-out semaphore), upsert. `on_progress` and
    /// `is_cancelled` are injected so the synchronous upload route can pass
    /// no-ops instead of threading a `JobContext` through a request that
    /// has none.
    pub async fn ingest_all_sheets(
        &self,
        payload: &WorkbookIngestPayload,
        on_progress: impl Fn(Progress),
        is_cancelled: impl Fn() -> bool,
    ) -> IngestOutcome {
        let workbook_bytes = match hex::decode(&payload.workbook_hex) {
            Ok(b) => b,
            Err(e) => {
                return IngestOutcome::Failed(JobError::new(
                    JobErrorKind::Validation,
                    format!("workbook_hex is not valid hex: {e}"),
                ))
            }
        };

        let content_hash = Sha256::digest(&workbook_bytes);

        let blocks = match self.decoder.decompose(&workbook_bytes) {
            Ok(b) => b,
            Err(e) => {
                return IngestOutcome::Failed(JobError::new(JobErrorKind::ParseTotalFailure, e.to_string()))
            }
        };
        if blocks.is_empty() {
            return IngestOutcome::Failed(JobError::new(
                JobErrorKind::ParseTotalFailure,
                "workbook contains no sheets",
            ));
        }
        if is_cancelled() {
            return IngestOutcome::Failed(JobError::new(JobErrorKind::Cancelled, "cancelled"));
        }

        let total = blocks.len() as u32;
        on_progress(Progress::new(total));

        let completed = AtomicU32::new(0);
        let failed = AtomicU32::new(0);
        let outcomes = Mutex::new(Vec::with_capacity(blocks.len()));
        let portfolio_ids = Mutex::new(Vec::new());

        stream::iter(blocks.iter())
            .map(|block| async {
                if is_cancelled() {
                    return;
                }

                let outcome = self.parse_one_sheet(block, &content_hash, payload).await;
                let (done, fail) = match outcome {
                    Ok(portfolio) => {
                        portfolio_ids.lock().await.push(portfolio.id.clone());
                        outcomes.lock().await.push(SheetOutcome {
                            sheet_name: block.sheet_name.clone(),
                            portfolio_id: Some(portfolio.id),
                            error: None,
                        });
                        (completed.fetch_add(1, Ordering::SeqCst) + 1, failed.load(Ordering::SeqCst))
                    }
                    Err(e) => {
                        warn!(sheet = %block.sheet_name, error = %e, "sheet parse failed");
                        outcomes.lock().await.push(SheetOutcome {
                            sheet_name: block.sheet_name.clone(),
                            portfolio_id: None,
                            error: Some(e),
                        });
                        (completed.load(Ordering::SeqCst), failed.fetch_add(1, Ordering::SeqCst) + 1)
                    }
                };

                let mut progress = Progress::new(total);
                progress.completed = done;
                progress.failed = fail;
                progress.current_item = Some(block.sheet_name.clone());
                progress.recompute_percentage();
                on_progress(progress);
            })
            .buffer_unordered(self.sheet_concurrency)
            .collect::<Vec<()>>()
            .await;

        if is_cancelled() {
            return IngestOutcome::Failed(JobError::new(JobErrorKind::Cancelled, "cancelled"));
        }

        let portfolio_ids = portfolio_ids.into_inner();
        let outcomes = outcomes.into_inner();
        if portfolio_ids.is_empty() {
            return IngestOutcome::Failed(JobError::new(
                JobErrorKind::ParseTotalFailure,
                "no sheet in this workbook produced a portfolio",
            ));
        }

        IngestOutcome::Completed(json!({
            "parsed": completed.load(Ordering::SeqCst),
            "failed": failed.load(Ordering::SeqCst),
            "portfolio_ids": portfolio_ids,
            "sheets": outcomes,
        }))
    }

    async fn parse_one_sheet(
        &self,
        block: &TabularBlock,
        content_hash: &[u8],
        payload: &WorkbookIngestPayload,
    ) -> Result<Portfolio, String> {
        let sid = derive_sheet_identity(content_hash, block.sheet_index, &block.sheet_name);

        let holdings = match payload.parse_method.as_str() {
            "llm" => self.parse_with_llm_or_fallback(block).await?,
            _ => manual_parse(block)?,
        };

        let portfolio = Portfolio::assemble(
            sid,
            block.sheet_name.clone(),
            payload.portfolio_date.clone(),
            holdings,
        );

        self.repo
            .upsert(&portfolio)
            .await
            .map(|(saved, _inserted)| saved)
            .map_err(|e| e.to_string())
    }

    async fn parse_with_llm_or_fallback(&self, block: &TabularBlock) -> Result<Vec<PortfolioHolding>, String> {
        let Some(llm) = &self.llm else {
            // The caller pinned `parse_method: "llm"` explicitly (this
            // method is only reached for that pin); with no adapter
            // configured that is a per-sheet error, not a silent manual
            // downgrade.
            return Err("llm adapter unavailable".to_string());
        };

        let _permit = self.llm_fanout.acquire().await.map_err(|e| e.to_string())?;
        match llm.extract_portfolio(block).await {
            Ok(extract) => Ok(extract.holdings),
            Err(e) => {
                if llm.should_fallback_on_error(&e) {
                    manual_parse(block)
                } else {
                    Err(e.to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(headers: &[&str], rows: &[&[&str]]) -> TabularBlock {
        TabularBlock {
            sheet_name: "YO01".to_string(),
            sheet_index: 0,
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn sheet_identity_is_deterministic() {
        let hash = Sha256::digest(b"same workbook bytes");
        let a = derive_sheet_identity(&hash, 0, "YO01");
        let b = derive_sheet_identity(&hash, 0, "YO01");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn sheet_identity_distinguishes_index_and_name() {
        let hash = Sha256::digest(b"same workbook bytes");
        let by_index = derive_sheet_identity(&hash, 1, "YO01");
        let by_name = derive_sheet_identity(&hash, 0, "YO03");
        let base = derive_sheet_identity(&hash, 0, "YO01");
        assert_ne!(base, by_index);
        assert_ne!(base, by_name);
    }

    #[test]
    fn sheet_identity_distinguishes_workbook() {
        let a = derive_sheet_identity(&Sha256::digest(b"workbook a"), 0, "YO01");
        let b = derive_sheet_identity(&Sha256::digest(b"workbook b"), 0, "YO01");
        assert_ne!(a, b);
    }

    #[test]
    fn header_synonyms_resolve_case_and_whitespace_insensitively() {
        assert_eq!(normalize_header("ISIN"), Some("isin_code"));
        assert_eq!(normalize_header("  Isin Code  "), Some("isin_code"));
        assert_eq!(normalize_header("Name of Instrument"), Some("name_of_instrument"));
        assert_eq!(normalize_header("% to NAV"), Some("percentage_to_nav"));
        assert_eq!(normalize_header("Sector"), None);
    }

    #[test]
    fn manual_parse_maps_synonym_headers_and_skips_blank_rows() {
        let b = block(
            &["Security Name", "ISIN Code", "% to Net Assets"],
            &[
                &["HDFC Bank", "INE040A01034", "8.5"],
                &["", "", ""],
                &["Infosys", "INE009A01021", "6.2"],
            ],
        );
        let holdings = manual_parse(&b).expect("recognizable holdings table");
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].name_of_instrument, "HDFC Bank");
        assert_eq!(holdings[0].isin_code, "INE040A01034");
        assert_eq!(holdings[1].name_of_instrument, "Infosys");
    }

    #[test]
    fn manual_parse_fails_without_name_and_isin_columns() {
        let b = block(&["Sector", "Weight"], &[&["Financials", "20%"]]);
        assert!(manual_parse(&b).is_err());
    }

    #[test]
    fn manual_parse_fails_when_no_rows_survive() {
        let b = block(&["ISIN", "Name of Instrument"], &[&["", ""]]);
        assert!(manual_parse(&b).is_err());
    }
}
