//! Question answering over the indexed documents.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;
use govrag_chat::GenerationOverrides;
use govrag_core::Error;
use govrag_resolve::{Answer, QueryRequest};
use govrag_store::{SearchConfig, SearchType};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/query", post(query))
}

/// Flat request body of `POST /query`.
#[derive(Debug, Default, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub query: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub search_type: Option<String>,
    pub search_k: Option<usize>,
    pub score_threshold: Option<f32>,
}

impl QueryBody {
    pub fn into_request(self) -> Result<QueryRequest, Error> {
        let defaults = SearchConfig::default();
        let search_type = match self.search_type.as_deref() {
            Some(raw) => raw.parse::<SearchType>()?,
            None => defaults.search_type,
        };
        Ok(QueryRequest {
            query: self.query,
            search: SearchConfig {
                search_type,
                k: self.search_k.unwrap_or(defaults.k),
                score_threshold: self.score_threshold,
                ..defaults
            },
            generation: GenerationOverrides {
                provider: self.provider,
                model: self.model,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
        })
    }
}

/// POST /query — `{answer, sources}`.
async fn query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryBody>,
) -> Result<Json<Answer>, ApiError> {
    let request = body.into_request()?;
    let answer = state.engine.answer(request).await?;
    Ok(Json(answer))
}
