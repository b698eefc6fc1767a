//! Ingestion routes: synchronous directory runs, uploads and job status.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use govrag_ingest::IngestSummary;
use govrag_runtime::IngestionJob;

const DEFAULT_DATA_DIR: &str = "data/";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/ingest/upload", post(upload))
        .route("/ingest/jobs", get(list_jobs))
        .route("/ingest/jobs/{job_id}", get(get_job))
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub clear_existing: bool,
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

/// POST /ingest — ingest a directory and wait for the summary.
async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestSummary>, ApiError> {
    let dir = PathBuf::from(&req.data_dir);
    info!("Ingest request for {} (clear_existing={})", dir.display(), req.clear_existing);

    let orchestrator = state.orchestrator.clone();
    let summary = tokio::task::spawn_blocking(move || orchestrator.ingest(&dir, req.clear_existing))
        .await
        .map_err(|e| ApiError::internal(format!("ingestion task failed: {}", e)))??;
    Ok(Json(summary))
}

/// POST /ingest/upload — stage one file and queue it for background ingestion.
async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if field.name().is_some_and(|name| name != "file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;

        let job = state.orchestrator.submit_upload(&filename, &bytes)?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "status": "accepted",
                "message": format!("File '{}' accepted for ingestion", job.filename),
                "job_id": job.id,
            })),
        ));
    }
    Err(ApiError::bad_request("No file provided in field 'file'"))
}

/// GET /ingest/jobs — all known jobs in submission order.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let jobs = state.orchestrator.jobs();
    Json(serde_json::json!({
        "total": jobs.len(),
        "jobs": jobs,
    }))
}

/// GET /ingest/jobs/{job_id}
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<IngestionJob>, ApiError> {
    state
        .orchestrator
        .job(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", job_id)))
}
