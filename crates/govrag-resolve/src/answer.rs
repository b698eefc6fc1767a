//! Grounded answers: retrieve, build the prompt, ask the provider.

use std::sync::Arc;

use tracing::{debug, info};

use crate::retrieval::Retriever;
use crate::types::{Answer, QueryRequest, SourceRef};
use govrag_chat::{build_prompt, GenerationConfig, LlmSettings, ProviderGateway};
use govrag_core::{Error, Result, ValidationError};

pub struct QueryEngine {
    retriever: Arc<Retriever>,
    gateway: Arc<ProviderGateway>,
    settings: Arc<LlmSettings>,
}

impl QueryEngine {
    pub fn new(retriever: Arc<Retriever>, gateway: Arc<ProviderGateway>, settings: LlmSettings) -> Self {
        Self {
            retriever,
            gateway,
            settings: Arc::new(settings),
        }
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub fn gateway(&self) -> &Arc<ProviderGateway> {
        &self.gateway
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    /// Answer a question from the indexed documents.
    ///
    /// Input problems (empty query, unknown provider, bad search or generation
    /// parameters) fail before the embedder or any provider is called.
    pub async fn answer(&self, request: QueryRequest) -> Result<Answer> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        let generation = GenerationConfig::resolve(&request.generation, &self.settings)?;
        request.search.validate(self.retriever.index().defaults())?;
        info!(
            "Query via {}/{} ({}, k={})",
            generation.provider, generation.model, request.search.search_type, request.search.k
        );

        let retriever = self.retriever.clone();
        let search = request.search;
        let text = query.clone();
        let hits = tokio::task::spawn_blocking(move || retriever.retrieve(&text, &search))
            .await
            .map_err(|e| Error::Internal(format!("retrieval task failed: {}", e)))??;
        debug!("Grounding answer on {} chunks", hits.len());

        let prompt = build_prompt(&query, &hits);
        let text = self.gateway.generate(&prompt, &generation).await?;

        Ok(Answer {
            text,
            sources: hits.iter().map(SourceRef::from).collect(),
        })
    }
}
