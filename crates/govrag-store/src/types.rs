//! Data types for documents, chunks, and search results.

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use govrag_core::ValidationError;

/// A source document known to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Canonical path for directory ingestion, `upload:<uuid>/<filename>` for uploads.
    pub id: String,
    /// Human-readable origin (file path or uploaded filename).
    pub source: String,
    pub format: String,
    /// Hex SHA-256 of the raw bytes.
    pub content_hash: String,
    pub size_bytes: u64,
    /// Milliseconds since epoch.
    pub ingested_at: i64,
}

/// One ordered segment of a document's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub document_id: String,
    pub sequence: usize,
    pub text: String,
    /// Character span `[char_start, char_end)` in the document text.
    pub char_start: usize,
    pub char_end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// A chunk together with its embedding, ready to be written.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: ChunkRecord,
    pub embedding: Array1<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Similarity,
    Mmr,
    SimilarityScoreThreshold,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Mmr => "mmr",
            Self::SimilarityScoreThreshold => "similarity_score_threshold",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "similarity" => Ok(Self::Similarity),
            "mmr" => Ok(Self::Mmr),
            "similarity_score_threshold" => Ok(Self::SimilarityScoreThreshold),
            other => Err(ValidationError::BadSearchConfig(format!(
                "unknown search type '{}'",
                other
            ))),
        }
    }
}

/// Defaults applied to fields a [`SearchConfig`] leaves unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchDefaults {
    pub max_k: usize,
    pub score_threshold: f32,
    pub mmr_lambda: f32,
    pub fetch_multiplier: usize,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            max_k: 20,
            score_threshold: 0.5,
            mmr_lambda: 0.5,
            fetch_multiplier: 4,
        }
    }
}

/// Caller-facing search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub search_type: SearchType,
    pub k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mmr_lambda: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_multiplier: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::similarity(5)
    }
}

impl SearchConfig {
    pub fn similarity(k: usize) -> Self {
        Self {
            search_type: SearchType::Similarity,
            k,
            score_threshold: None,
            mmr_lambda: None,
            fetch_multiplier: None,
        }
    }

    pub fn threshold(k: usize, score_threshold: f32) -> Self {
        Self {
            search_type: SearchType::SimilarityScoreThreshold,
            score_threshold: Some(score_threshold),
            ..Self::similarity(k)
        }
    }

    pub fn mmr(k: usize, lambda: f32) -> Self {
        Self {
            search_type: SearchType::Mmr,
            mmr_lambda: Some(lambda),
            ..Self::similarity(k)
        }
    }

    /// Check ranges and fill unset fields from `defaults`.
    ///
    /// `k` above `defaults.max_k` is capped; every other out-of-range value is
    /// rejected.
    pub fn validate(&self, defaults: &SearchDefaults) -> Result<ResolvedSearch, ValidationError> {
        if self.k == 0 {
            return Err(ValidationError::BadSearchConfig("k must be at least 1".into()));
        }
        let threshold = self.score_threshold.unwrap_or(defaults.score_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ValidationError::BadSearchConfig(format!(
                "score_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        let lambda = self.mmr_lambda.unwrap_or(defaults.mmr_lambda);
        if !(0.0..=1.0).contains(&lambda) {
            return Err(ValidationError::BadSearchConfig(format!(
                "mmr_lambda must be within [0, 1], got {}",
                lambda
            )));
        }
        let fetch_multiplier = self.fetch_multiplier.unwrap_or(defaults.fetch_multiplier);
        if fetch_multiplier == 0 {
            return Err(ValidationError::BadSearchConfig(
                "fetch_multiplier must be at least 1".into(),
            ));
        }

        Ok(ResolvedSearch {
            search_type: self.search_type,
            k: self.k.min(defaults.max_k.max(1)),
            score_threshold: threshold,
            mmr_lambda: lambda,
            fetch_multiplier,
        })
    }
}

/// A validated [`SearchConfig`] with every field concrete.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedSearch {
    pub search_type: SearchType,
    pub k: usize,
    pub score_threshold: f32,
    pub mmr_lambda: f32,
    pub fetch_multiplier: usize,
}

/// A search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub source: String,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Index statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimension: usize,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_is_capped_not_rejected() {
        let defaults = SearchDefaults::default();
        let resolved = SearchConfig::similarity(50).validate(&defaults).unwrap();
        assert_eq!(resolved.k, 20);

        let err = SearchConfig::similarity(0).validate(&defaults).unwrap_err();
        assert!(matches!(err, ValidationError::BadSearchConfig(_)));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let defaults = SearchDefaults::default();
        assert!(SearchConfig::threshold(5, 1.2).validate(&defaults).is_err());
        assert!(SearchConfig::mmr(5, -0.1).validate(&defaults).is_err());

        let mut cfg = SearchConfig::mmr(5, 0.3);
        cfg.fetch_multiplier = Some(0);
        assert!(cfg.validate(&defaults).is_err());
    }

    #[test]
    fn test_defaults_fill_unset_fields() {
        let defaults = SearchDefaults {
            max_k: 10,
            score_threshold: 0.25,
            mmr_lambda: 0.7,
            fetch_multiplier: 3,
        };
        let cfg = SearchConfig {
            search_type: SearchType::SimilarityScoreThreshold,
            ..SearchConfig::similarity(4)
        };
        let resolved = cfg.validate(&defaults).unwrap();
        assert_eq!(resolved.score_threshold, 0.25);
        assert_eq!(resolved.mmr_lambda, 0.7);
        assert_eq!(resolved.fetch_multiplier, 3);
    }

    #[test]
    fn test_search_type_wire_names() {
        assert_eq!(
            "similarity_score_threshold".parse::<SearchType>().unwrap(),
            SearchType::SimilarityScoreThreshold
        );
        assert_eq!(
            serde_json::to_string(&SearchType::Mmr).unwrap(),
            "\"mmr\""
        );
        assert!("bm25".parse::<SearchType>().is_err());
    }
}
