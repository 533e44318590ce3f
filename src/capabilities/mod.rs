//! External collaborator seams (§6): spreadsheet decoding, LLM-assisted
//! extraction, and the upstream ETF holdings source are all expressed as
//! traits injected at construction time, the same way the reference
//! backend isolates price-data sources behind `PriceProvider`.

pub mod llm_adapter;
pub mod sheet_decoder;
pub mod upstream_client;
