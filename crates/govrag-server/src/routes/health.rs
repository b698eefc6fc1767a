//! Service health and index statistics.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;
use govrag_runtime::JobState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

/// GET /health — index stats, embedder and provider availability.
async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stats = state.index.stats();
    let jobs = state.orchestrator.jobs();
    let pending = jobs
        .iter()
        .filter(|j| matches!(j.state, JobState::Accepted | JobState::Running))
        .count();
    let providers: Vec<&str> = state
        .engine
        .gateway()
        .providers()
        .into_iter()
        .map(|p| p.as_str())
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "index": stats,
        "embedder": state.embedder.name(),
        "default_provider": state.engine.settings().default_provider,
        "providers": providers,
        "ingestion_queue": {
            "pending": pending,
            "total": jobs.len(),
        },
    }))
}
