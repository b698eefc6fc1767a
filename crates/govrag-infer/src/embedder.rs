//! Embedding trait and the offline hashing implementation.
//!
//! Implementations:
//! - `OnnxEmbedder`: ONNX Runtime with multilingual-e5-base (feature `onnx`)
//! - `OllamaEmbedder`: local Ollama HTTP embeddings
//! - `HashingEmbedder`: deterministic character-trigram hashing, no model needed

use std::collections::HashMap;

use ndarray::Array1;

use govrag_core::EmbeddingError;

/// Text → fixed-dimension vector.
///
/// Calls may block (model inference, HTTP); async callers go through
/// `spawn_blocking`.
pub trait Embedder: Send + Sync {
    /// Embed passages for indexing.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>, EmbeddingError>;

    /// Embed a search query.
    fn embed_query(&self, text: &str) -> Result<Array1<f32>, EmbeddingError>;

    fn dimension(&self) -> usize;

    /// Backend identifier for logs and cache keys.
    fn name(&self) -> &str;
}

/// Reject a vector whose length drifted from the configured dimension.
pub fn check_dimension(expected: usize, vector: &Array1<f32>) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::Dimension {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

pub(crate) fn l2_normalize(mut v: Array1<f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    if norm > 1e-9 {
        v /= norm;
    }
    v
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "with", "from", "this", "that", "have", "has",
    "had", "its", "their", "they", "them", "der", "die", "das", "und", "les", "des", "est",
];

/// Trigram-hashing embedder for offline operation and tests.
///
/// Not semantic, but deterministic and content-dependent: texts sharing
/// words land close together.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Array1<f32> {
        let mut embedding = Array1::<f32>::zeros(self.dimension);
        let lower = text.to_lowercase();

        let mut word_freq: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let hash = window
                    .iter()
                    .fold(0u64, |acc, &c| acc.wrapping_mul(37).wrapping_add(c as u64));
                embedding[(hash % self.dimension as u64) as usize] += (*freq as f32).sqrt();
            }
            let word_hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            embedding[(word_hash % self.dimension as u64) as usize] += *freq as f32;
        }

        l2_normalize(embedding)
    }
}

impl Embedder for HashingEmbedder {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Array1<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn embed_query(&self, text: &str) -> Result<Array1<f32>, EmbeddingError> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed_query("Passport renewal requirements").unwrap();
        let b = embedder.embed_query("Passport renewal requirements").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((a.dot(&a).sqrt() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashingEmbedder::new(256);
        let docs = embedder
            .embed_documents(&[
                "How to renew a passport at the citizen office",
                "Parking permits for residents",
            ])
            .unwrap();
        let query = embedder.embed_query("renew passport").unwrap();
        assert!(query.dot(&docs[0]) > query.dot(&docs[1]));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        let v = embedder.embed_query("   ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_check_dimension() {
        let v = Array1::<f32>::zeros(3);
        assert!(check_dimension(3, &v).is_ok());
        assert!(matches!(
            check_dimension(4, &v),
            Err(EmbeddingError::Dimension { expected: 4, actual: 3 })
        ));
    }
}
