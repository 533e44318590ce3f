//! Job handlers (§4.6, §4.7): the domain logic run by the scheduler's
//! worker pool. Each implements `jobs::registry::JobHandler` and is wired
//! into the `HandlerRegistry` once in `AppState`.

pub mod holdings_fetch;
pub mod workbook_ingest;
