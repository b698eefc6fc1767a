//! Shared application state.

use std::sync::Arc;

use govrag_chat::{LlmSettings, ProviderGateway};
use govrag_core::{GovRagConfig, Result};
use govrag_infer::Embedder;
use govrag_ingest::Ingester;
use govrag_resolve::{QueryEngine, Retriever};
use govrag_runtime::IngestionOrchestrator;
use govrag_store::{SearchDefaults, VectorIndex};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: GovRagConfig,
    pub index: Arc<VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub engine: QueryEngine,
}

impl AppState {
    /// Wire the ingestion and query pipelines around one index and embedder.
    pub fn new(
        config: GovRagConfig,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        gateway: ProviderGateway,
        settings: LlmSettings,
    ) -> Result<Self> {
        let ingester = Ingester::from_config(&config, embedder.clone(), index.clone())?;
        let orchestrator = Arc::new(IngestionOrchestrator::new(
            Arc::new(ingester),
            config.data_paths.uploads.clone(),
        ));
        let retriever = Retriever::new(embedder.clone(), index.clone());
        let engine = QueryEngine::new(Arc::new(retriever), Arc::new(gateway), settings);

        Ok(Self {
            config,
            index,
            embedder,
            orchestrator,
            engine,
        })
    }
}

/// Search defaults derived from configuration.
pub fn search_defaults(config: &GovRagConfig) -> SearchDefaults {
    SearchDefaults {
        max_k: config.max_search_k,
        score_threshold: config.default_score_threshold,
        mmr_lambda: config.mmr_lambda,
        fetch_multiplier: config.mmr_fetch_multiplier,
    }
}
