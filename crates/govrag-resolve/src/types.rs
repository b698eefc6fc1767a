//! Query and answer types.

use serde::{Deserialize, Serialize};

use govrag_chat::GenerationOverrides;
use govrag_store::{ScoredChunk, SearchConfig};

/// A question plus how to search and which model to ask.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub generation: GenerationOverrides,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

/// A chunk the answer was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: String,
    pub source: String,
    pub sequence: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub score: f32,
}

impl From<&ScoredChunk> for SourceRef {
    fn from(hit: &ScoredChunk) -> Self {
        Self {
            document_id: hit.chunk.document_id.clone(),
            source: hit.source.clone(),
            sequence: hit.chunk.sequence,
            page: hit.chunk.page,
            score: hit.score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "answer")]
    pub text: String,
    pub sources: Vec<SourceRef>,
}
