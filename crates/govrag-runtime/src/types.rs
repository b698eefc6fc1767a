//! Ingestion job records.

use serde::{Deserialize, Serialize};

use govrag_ingest::IngestSummary;

/// Lifecycle of an ingestion job. `Succeeded`, `PartiallyFailed` and `Failed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Accepted,
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallyFailed | Self::Failed)
    }

    /// Terminal state for a finished run.
    pub fn from_summary(summary: &IngestSummary) -> Self {
        match (summary.documents_processed, summary.failures.len()) {
            (_, 0) => Self::Succeeded,
            (0, _) => Self::Failed,
            _ => Self::PartiallyFailed,
        }
    }
}

/// A queued ingestion, as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: String,
    /// Uploaded filename, or the directory for directory jobs.
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub state: JobState,
    /// Per-document results, set when the job finishes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<IngestSummary>,
    pub queued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestionJob {
    pub(crate) fn accepted(id: String, filename: String, document_id: Option<String>) -> Self {
        Self {
            id,
            filename,
            document_id,
            state: JobState::Accepted,
            outcomes: None,
            queued_at: now_millis(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
