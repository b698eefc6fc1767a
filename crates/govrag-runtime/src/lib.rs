//! GovRAG Runtime — the ingestion orchestrator.
//!
//! Directory ingestion runs synchronously on the caller's thread; uploads are
//! staged to disk and processed FIFO by a single background worker.

pub mod orchestrator;
pub mod types;

pub use orchestrator::{IngestionOrchestrator, JOB_HISTORY_LIMIT};
pub use types::*;
