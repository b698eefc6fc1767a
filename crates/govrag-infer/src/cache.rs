//! LRU + TTL cache for query embeddings.
//!
//! Repeated questions skip the embedding backend. Default: 1000 entries,
//! 1-hour TTL.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use ndarray::Array1;
use parking_lot::Mutex;
use serde::Serialize;

struct CacheEntry {
    embedding: Array1<f32>,
    inserted_at: Instant,
}

/// Hit/miss counters since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe query embedding cache.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Least recently used at the front.
    recency: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }

    fn forget(&mut self, key: &str) {
        self.entries.remove(key);
        self.recency.retain(|k| k != key);
    }
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity),
                recency: VecDeque::with_capacity(capacity),
                capacity,
                ttl,
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Look up `key`, counting the hit or miss. Expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<Array1<f32>> {
        let mut inner = self.inner.lock();
        let ttl = inner.ttl;
        let found = inner
            .entries
            .get(key)
            .map(|e| (e.inserted_at.elapsed() < ttl, e.embedding.clone()));

        match found {
            Some((true, embedding)) => {
                inner.hits += 1;
                inner.touch(key);
                Some(embedding)
            }
            Some((false, _)) => {
                inner.misses += 1;
                inner.forget(key);
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn put(&self, key: impl Into<String>, embedding: Array1<f32>) {
        let key = key.into();
        let mut inner = self.inner.lock();

        if inner.entries.contains_key(&key) {
            inner.touch(&key);
        } else {
            while inner.entries.len() >= inner.capacity {
                match inner.recency.pop_front() {
                    Some(oldest) => {
                        inner.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            inner.recency.push_back(key.clone());
        }
        inner.entries.insert(
            key,
            CacheEntry {
                embedding,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Return the cached value for `key` or compute, store and return it.
    pub fn get_or_insert_with<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<Array1<f32>, E>,
    ) -> Result<Array1<f32>, E> {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let embedding = compute()?;
        self.put(key, embedding.clone());
        Ok(embedding)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(3600))
    }
}
