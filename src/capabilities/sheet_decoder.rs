use serde::{Deserialize, Serialize};

/// One sheet's tabular content after workbook decomposition: a header row
/// and the data rows beneath it, exactly as read off the sheet (no
/// normalization yet — that is the manual parser's job, §4.6 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularBlock {
    pub sheet_name: String,
    pub sheet_index: u32,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Reads workbook bytes and splits them into per-sheet tabular blocks.
/// §1/§6: an external collaborator, out of scope for this crate's own
/// logic — the decoder's internals (xlsx/ods parsing) live outside the job
/// subsystem. This trait is the seam the spreadsheet workflow handler
/// (§4.6) calls through, the same way the reference backend treats price
/// data sources as a `PriceProvider` trait object rather than inlining
/// HTTP parsing into its services.
pub trait SheetDecoder: Send + Sync {
    fn decompose(&self, workbook_bytes: &[u8]) -> Result<Vec<TabularBlock>, DecodeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("workbook is empty or unreadable: {0}")]
    Unreadable(String),
    #[error("no sheets found in workbook")]
    NoSheets,
}

/// Placeholder decoder used only where no real decoder capability has been
/// wired in (e.g. default test fixtures). Production deployments inject a
/// real xlsx/ods decoder implementing this trait; this crate's job is to
/// call it, not to parse spreadsheet binary formats itself.
pub struct UnimplementedSheetDecoder;

impl SheetDecoder for UnimplementedSheetDecoder {
    fn decompose(&self, _workbook_bytes: &[u8]) -> Result<Vec<TabularBlock>, DecodeError> {
        Err(DecodeError::Unreadable(
            "no spreadsheet decoder configured".to_string(),
        ))
    }
}
