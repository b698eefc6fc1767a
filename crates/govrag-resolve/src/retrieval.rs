//! Query embedding plus validated search over the vector index.

use std::sync::Arc;

use tracing::debug;

use govrag_core::{Result, ValidationError};
use govrag_infer::{CacheStats, Embedder, QueryCache};
use govrag_store::{ScoredChunk, SearchConfig, VectorIndex};

/// Embeds queries (with a cache) and searches the index.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    cache: QueryCache,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            cache: QueryCache::default(),
        }
    }

    pub fn with_cache(mut self, cache: QueryCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Blocking: may call a remote embedder.
    ///
    /// The config is validated before the query is embedded, so a bad request
    /// never reaches the embedding backend. An empty index yields no hits.
    pub fn retrieve(&self, query: &str, config: &SearchConfig) -> Result<Vec<ScoredChunk>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        let resolved = config.validate(self.index.defaults())?;
        if self.index.is_empty() {
            debug!("Index is empty; nothing to retrieve");
            return Ok(Vec::new());
        }

        let embedding = self
            .cache
            .get_or_insert_with(query, || self.embedder.embed_query(query))?;
        let hits = self.index.snapshot().search(&embedding, &resolved)?;
        debug!(
            "Retrieved {} chunks ({}, k={})",
            hits.len(),
            resolved.search_type,
            resolved.k
        );
        Ok(hits)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use govrag_core::{EmbeddingError, Error};
    use govrag_infer::HashingEmbedder;
    use govrag_store::{ChunkRecord, DocumentRecord, IndexEntry, SearchDefaults};
    use ndarray::Array1;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const DIM: usize = 128;

    /// Counts query embeddings on top of the hashing embedder.
    pub(crate) struct CountingEmbedder {
        inner: HashingEmbedder,
        pub(crate) queries: AtomicUsize,
    }

    impl CountingEmbedder {
        pub(crate) fn new() -> Self {
            Self {
                inner: HashingEmbedder::new(DIM),
                queries: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for CountingEmbedder {
        fn embed_documents(&self, texts: &[&str]) -> std::result::Result<Vec<Array1<f32>>, EmbeddingError> {
            self.inner.embed_documents(texts)
        }

        fn embed_query(&self, text: &str) -> std::result::Result<Array1<f32>, EmbeddingError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_query(text)
        }

        fn dimension(&self) -> usize {
            DIM
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    /// Index one single-chunk document per text, ids `doc-0`, `doc-1`, ...
    pub(crate) fn populated_index(embedder: &dyn Embedder, texts: &[&str]) -> Arc<VectorIndex> {
        let index = VectorIndex::in_memory(DIM, SearchDefaults::default()).unwrap();
        let embeddings = embedder.embed_documents(texts).unwrap();
        for (i, (text, embedding)) in texts.iter().zip(embeddings).enumerate() {
            let id = format!("doc-{}", i);
            let document = DocumentRecord {
                id: id.clone(),
                source: format!("/docs/{}.txt", id),
                format: "txt".into(),
                content_hash: String::new(),
                size_bytes: text.len() as u64,
                ingested_at: 0,
            };
            let chunk = ChunkRecord {
                document_id: id,
                sequence: 0,
                text: text.to_string(),
                char_start: 0,
                char_end: text.chars().count(),
                page: Some(1),
            };
            index
                .upsert_document(document, vec![IndexEntry { chunk, embedding }])
                .unwrap();
        }
        Arc::new(index)
    }

    const TEXTS: [&str; 3] = [
        "Como renovar o passaporte brasileiro comum",
        "Horário de atendimento da receita federal",
        "Emissão da carteira de identidade nacional",
    ];

    #[test]
    fn test_best_match_first() {
        let embedder = Arc::new(CountingEmbedder::new());
        let index = populated_index(embedder.as_ref(), &TEXTS);
        let retriever = Retriever::new(embedder, index);

        let hits = retriever
            .retrieve("renovar passaporte", &SearchConfig::similarity(2))
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.document_id, "doc-0");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_query_embedding_is_cached() {
        let embedder = Arc::new(CountingEmbedder::new());
        let index = populated_index(embedder.as_ref(), &TEXTS);
        let retriever = Retriever::new(embedder.clone(), index);

        let first = retriever.retrieve("identidade", &SearchConfig::default()).unwrap();
        let second = retriever.retrieve("  identidade ", &SearchConfig::mmr(2, 0.5)).unwrap();
        assert_eq!(first[0].chunk.document_id, second[0].chunk.document_id);
        assert_eq!(embedder.queries.load(Ordering::SeqCst), 1);
        assert_eq!(retriever.cache_stats().hits, 1);
    }

    #[test]
    fn test_invalid_config_rejected_before_embedding() {
        let embedder = Arc::new(CountingEmbedder::new());
        let index = populated_index(embedder.as_ref(), &TEXTS);
        let retriever = Retriever::new(embedder.clone(), index);

        let err = retriever
            .retrieve("passaporte", &SearchConfig::similarity(0))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::BadSearchConfig(_))));
        let err = retriever
            .retrieve("passaporte", &SearchConfig::threshold(3, -0.1))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(embedder.queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_index_and_empty_query() {
        let embedder = Arc::new(CountingEmbedder::new());
        let index = Arc::new(VectorIndex::in_memory(DIM, SearchDefaults::default()).unwrap());
        let retriever = Retriever::new(embedder.clone(), index);

        assert!(retriever.retrieve("qualquer coisa", &SearchConfig::default()).unwrap().is_empty());
        assert!(matches!(
            retriever.retrieve("   ", &SearchConfig::default()).unwrap_err(),
            Error::Validation(ValidationError::EmptyQuery)
        ));
        assert_eq!(embedder.queries.load(Ordering::SeqCst), 0);
    }
}
