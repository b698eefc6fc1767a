//! Persistent vector index with snapshot-isolated reads.
//!
//! SQLite is the source of truth; serving happens from an immutable
//! [`IndexSnapshot`] that is rebuilt and swapped in after every committed
//! write. Readers clone the current `Arc` and never wait on the writer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array1;
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::mmr::{mmr_select, MmrCandidate};
use crate::schema::{META_DIMENSION, SCHEMA_SQL};
use crate::types::*;
use govrag_core::{Error, IndexError, Result};

const DB_FILE: &str = "govrag.db";

/// Vector index over document chunks.
pub struct VectorIndex {
    dimension: usize,
    defaults: SearchDefaults,
    db_path: Option<PathBuf>,
    /// Serializes writers; owns the connection.
    writer: Mutex<Writer>,
    current: RwLock<Arc<IndexSnapshot>>,
}

struct Writer {
    conn: Connection,
    /// Next insertion sequence number. Never reused, so ordering by it is
    /// insertion order across the lifetime of the database.
    next_seq: i64,
}

#[derive(Debug)]
struct StoredEntry {
    seq: i64,
    chunk: ChunkRecord,
    /// L2-normalized.
    embedding: Array1<f32>,
}

/// Immutable view of the index at one version.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    version: u64,
    dimension: usize,
    documents: HashMap<String, Arc<DocumentRecord>>,
    /// Ascending by insertion sequence.
    entries: Vec<Arc<StoredEntry>>,
}

impl VectorIndex {
    /// Open or create the index under `dir` (file `dir/govrag.db`).
    ///
    /// Fails with [`IndexError::NotInitialized`] when the stored data cannot be
    /// served: a different persisted dimension or unreadable rows.
    pub fn open(dir: impl AsRef<Path>, dimension: usize, defaults: SearchDefaults) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join(DB_FILE);

        let conn = Connection::open(&db_path).map_err(|e| {
            IndexError::NotInitialized(format!("cannot open {}: {}", db_path.display(), e))
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;

        let index = Self::from_connection(conn, dimension, defaults, Some(db_path))?;
        let stats = index.stats();
        info!(
            "VectorIndex opened: {} documents, {} chunks, dim={}, path={}",
            stats.documents,
            stats.chunks,
            dimension,
            stats.db_path.as_deref().unwrap_or("-")
        );
        Ok(index)
    }

    /// A non-persistent index, for tests and throwaway use.
    pub fn in_memory(dimension: usize, defaults: SearchDefaults) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_err)?;
        Self::from_connection(conn, dimension, defaults, None)
    }

    fn from_connection(
        conn: Connection,
        dimension: usize,
        defaults: SearchDefaults,
        db_path: Option<PathBuf>,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(IndexError::NotInitialized("dimension must be positive".into()).into());
        }
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| IndexError::NotInitialized(format!("schema init failed: {}", e)))?;
        check_dimension(&conn, dimension)?;

        let documents = load_documents(&conn)?;
        let entries = load_entries(&conn, dimension)?;
        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(1);

        let snapshot = IndexSnapshot {
            version: 0,
            dimension,
            documents,
            entries,
        };

        Ok(Self {
            dimension,
            defaults,
            db_path,
            writer: Mutex::new(Writer { conn, next_seq }),
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn defaults(&self) -> &SearchDefaults {
        &self.defaults
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Insert a document, replacing every entry of a previous version.
    ///
    /// All embeddings are checked before anything is written; a single wrong
    /// dimension rejects the whole document. Returns the number of chunks stored.
    pub fn upsert_document(&self, document: DocumentRecord, entries: Vec<IndexEntry>) -> Result<usize> {
        for entry in &entries {
            if entry.embedding.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: entry.embedding.len(),
                }
                .into());
            }
        }

        let mut guard = self.writer.lock();
        let Writer { conn, next_seq } = &mut *guard;

        let first_seq = *next_seq;
        let stored: Vec<Arc<StoredEntry>> = entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                let mut chunk = entry.chunk;
                chunk.document_id = document.id.clone();
                Arc::new(StoredEntry {
                    seq: first_seq + i as i64,
                    chunk,
                    embedding: l2_normalize(&entry.embedding),
                })
            })
            .collect();

        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM chunks WHERE document_id = ?1", params![document.id])
            .map_err(db_err)?;
        tx.execute("DELETE FROM documents WHERE id = ?1", params![document.id])
            .map_err(db_err)?;
        tx.execute(
            "INSERT INTO documents (id, source, format, content_hash, size_bytes, ingested_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                document.id,
                document.source,
                document.format,
                document.content_hash,
                document.size_bytes as i64,
                document.ingested_at,
            ],
        )
        .map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO chunks (seq, document_id, sequence, text, char_start, char_end, page, embedding) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(db_err)?;
            for entry in &stored {
                let chunk = &entry.chunk;
                stmt.execute(params![
                    entry.seq,
                    chunk.document_id,
                    chunk.sequence as i64,
                    chunk.text,
                    chunk.char_start as i64,
                    chunk.char_end as i64,
                    chunk.page.map(i64::from),
                    encode_embedding(&entry.embedding),
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)?;
        *next_seq += stored.len() as i64;

        let count = stored.len();
        let next = self.snapshot().with_document(document, stored);
        debug!(
            "Published index version {} ({} chunks)",
            next.version,
            next.entries.len()
        );
        *self.current.write() = Arc::new(next);
        Ok(count)
    }

    /// Remove every document and entry.
    pub fn clear(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        let tx = guard.conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM chunks", []).map_err(db_err)?;
        tx.execute("DELETE FROM documents", []).map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        let previous = self.snapshot();
        let next = IndexSnapshot {
            version: previous.version + 1,
            dimension: self.dimension,
            documents: HashMap::new(),
            entries: Vec::new(),
        };
        *self.current.write() = Arc::new(next);
        info!("VectorIndex cleared");
        Ok(())
    }

    /// Remove one document. Returns whether it existed.
    pub fn delete_document(&self, document_id: &str) -> Result<bool> {
        let mut guard = self.writer.lock();
        let tx = guard.conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM chunks WHERE document_id = ?1", params![document_id])
            .map_err(db_err)?;
        let removed = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![document_id])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        if removed > 0 {
            let next = self.snapshot().without_document(document_id);
            *self.current.write() = Arc::new(next);
        }
        Ok(removed > 0)
    }

    /// Validate `config` against the index defaults and search the current snapshot.
    pub fn search(&self, query: &Array1<f32>, config: &SearchConfig) -> Result<Vec<ScoredChunk>> {
        let resolved = config.validate(&self.defaults)?;
        self.snapshot().search(query, &resolved)
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot();
        IndexStats {
            documents: snapshot.document_count(),
            chunks: snapshot.chunk_count(),
            dimension: self.dimension,
            version: snapshot.version,
            db_path: self.db_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

impl IndexSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.entries.len()
    }

    pub fn document(&self, document_id: &str) -> Option<&DocumentRecord> {
        self.documents.get(document_id).map(|d| d.as_ref())
    }

    pub fn document_ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    /// Chunks of one document in sequence order.
    pub fn chunks_of(&self, document_id: &str) -> Vec<&ChunkRecord> {
        let mut chunks: Vec<&ChunkRecord> = self
            .entries
            .iter()
            .filter(|e| e.chunk.document_id == document_id)
            .map(|e| &e.chunk)
            .collect();
        chunks.sort_by_key(|c| c.sequence);
        chunks
    }

    /// Run a validated search against this snapshot.
    pub fn search(&self, query: &Array1<f32>, search: &ResolvedSearch) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            }
            .into());
        }
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let ranked = self.rank(&l2_normalize(query));
        let k = search.k;
        let picks: Vec<(usize, f32)> = match search.search_type {
            SearchType::Similarity => ranked.into_iter().take(k).collect(),
            SearchType::SimilarityScoreThreshold => ranked
                .into_iter()
                .take_while(|&(_, score)| score >= search.score_threshold)
                .take(k)
                .collect(),
            SearchType::Mmr => {
                let pool_size = k.saturating_mul(search.fetch_multiplier).max(k);
                let pool: Vec<(usize, f32)> = ranked.into_iter().take(pool_size).collect();
                let candidates: Vec<MmrCandidate<'_>> = pool
                    .iter()
                    .map(|&(idx, score)| MmrCandidate {
                        relevance: score,
                        vector: &self.entries[idx].embedding,
                    })
                    .collect();
                mmr_select(&candidates, k, search.mmr_lambda)
                    .into_iter()
                    .map(|p| pool[p])
                    .collect()
            }
        };

        Ok(picks
            .into_iter()
            .map(|(idx, score)| self.hit(idx, score))
            .collect())
    }

    /// Every entry scored against `query`, best first; equal scores keep
    /// insertion order.
    fn rank(&self, query: &Array1<f32>) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (idx, e.embedding.dot(query)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    fn hit(&self, idx: usize, score: f32) -> ScoredChunk {
        let chunk = self.entries[idx].chunk.clone();
        let source = self
            .documents
            .get(&chunk.document_id)
            .map(|d| d.source.clone())
            .unwrap_or_else(|| chunk.document_id.clone());
        ScoredChunk {
            chunk,
            source,
            score,
        }
    }

    fn with_document(&self, document: DocumentRecord, stored: Vec<Arc<StoredEntry>>) -> Self {
        let mut next = self.without_document(&document.id);
        next.documents.insert(document.id.clone(), Arc::new(document));
        next.entries.extend(stored);
        next
    }

    fn without_document(&self, document_id: &str) -> Self {
        let mut documents = self.documents.clone();
        documents.remove(document_id);
        let entries = self
            .entries
            .iter()
            .filter(|e| e.chunk.document_id != document_id)
            .cloned()
            .collect();
        Self {
            version: self.version + 1,
            dimension: self.dimension,
            documents,
            entries,
        }
    }
}

fn check_dimension(conn: &Connection, dimension: usize) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            params![META_DIMENSION],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;

    match stored {
        Some(value) => {
            let persisted: usize = value.parse().map_err(|_| {
                IndexError::NotInitialized(format!("unreadable stored dimension '{}'", value))
            })?;
            if persisted != dimension {
                return Err(IndexError::NotInitialized(format!(
                    "index was built with dimension {} but {} is configured",
                    persisted, dimension
                ))
                .into());
            }
        }
        None => {
            conn.execute(
                "INSERT INTO index_meta (key, value) VALUES (?1, ?2)",
                params![META_DIMENSION, dimension.to_string()],
            )
            .map_err(db_err)?;
        }
    }
    Ok(())
}

fn load_documents(conn: &Connection) -> Result<HashMap<String, Arc<DocumentRecord>>> {
    let mut stmt = conn
        .prepare("SELECT id, source, format, content_hash, size_bytes, ingested_at FROM documents")
        .map_err(db_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DocumentRecord {
                id: row.get(0)?,
                source: row.get(1)?,
                format: row.get(2)?,
                content_hash: row.get(3)?,
                size_bytes: row.get::<_, i64>(4)?.max(0) as u64,
                ingested_at: row.get(5)?,
            })
        })
        .map_err(db_err)?;

    let mut documents = HashMap::new();
    for row in rows {
        let doc = row.map_err(|e| IndexError::NotInitialized(format!("bad document row: {}", e)))?;
        documents.insert(doc.id.clone(), Arc::new(doc));
    }
    Ok(documents)
}

fn load_entries(conn: &Connection, dimension: usize) -> Result<Vec<Arc<StoredEntry>>> {
    let mut stmt = conn
        .prepare(
            "SELECT seq, document_id, sequence, text, char_start, char_end, page, embedding \
             FROM chunks ORDER BY seq",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([], |row| {
            let seq: i64 = row.get(0)?;
            let chunk = ChunkRecord {
                document_id: row.get(1)?,
                sequence: row.get::<_, i64>(2)?.max(0) as usize,
                text: row.get(3)?,
                char_start: row.get::<_, i64>(4)?.max(0) as usize,
                char_end: row.get::<_, i64>(5)?.max(0) as usize,
                page: row.get::<_, Option<i64>>(6)?.map(|p| p.max(0) as u32),
            };
            let blob: Vec<u8> = row.get(7)?;
            Ok((seq, chunk, blob))
        })
        .map_err(db_err)?;

    let mut entries = Vec::new();
    for row in rows {
        let (seq, chunk, blob) =
            row.map_err(|e| IndexError::NotInitialized(format!("bad chunk row: {}", e)))?;
        if blob.len() != dimension * 4 {
            return Err(IndexError::NotInitialized(format!(
                "chunk {} has a {}-byte embedding, expected {}",
                seq,
                blob.len(),
                dimension * 4
            ))
            .into());
        }
        entries.push(Arc::new(StoredEntry {
            seq,
            chunk,
            embedding: decode_embedding(&blob),
        }));
    }
    debug!("Loaded {} index entries", entries.len());
    Ok(entries)
}

fn l2_normalize(v: &Array1<f32>) -> Array1<f32> {
    let norm = v.dot(v).sqrt();
    if norm > 1e-9 {
        v / norm
    } else {
        v.clone()
    }
}

fn encode_embedding(v: &Array1<f32>) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Array1<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn db_err(e: rusqlite::Error) -> Error {
    IndexError::Database(e.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn doc(id: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            source: format!("{}.txt", id),
            format: "txt".into(),
            content_hash: "00".into(),
            size_bytes: 10,
            ingested_at: 0,
        }
    }

    fn entry(doc_id: &str, sequence: usize, embedding: Array1<f32>) -> IndexEntry {
        IndexEntry {
            chunk: ChunkRecord {
                document_id: doc_id.to_string(),
                sequence,
                text: format!("{} chunk {}", doc_id, sequence),
                char_start: sequence * 10,
                char_end: sequence * 10 + 10,
                page: None,
            },
            embedding,
        }
    }

    fn index(dim: usize) -> VectorIndex {
        VectorIndex::in_memory(dim, SearchDefaults::default()).unwrap()
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = index(3);
        let hits = index
            .search(&array![1.0, 0.0, 0.0], &SearchConfig::similarity(5))
            .unwrap();
        assert!(hits.is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_similarity_order_and_sources() {
        let index = index(3);
        index
            .upsert_document(
                doc("a"),
                vec![
                    entry("a", 0, array![1.0, 0.0, 0.0]),
                    entry("a", 1, array![0.0, 1.0, 0.0]),
                ],
            )
            .unwrap();
        index
            .upsert_document(doc("b"), vec![entry("b", 0, array![0.9, 0.1, 0.0])])
            .unwrap();

        let hits = index
            .search(&array![1.0, 0.0, 0.0], &SearchConfig::similarity(2))
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.document_id, "a");
        assert_eq!(hits[0].chunk.sequence, 0);
        assert_eq!(hits[1].chunk.document_id, "b");
        assert_eq!(hits[1].source, "b.txt");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similarity_non_increasing_for_every_k() {
        let index = index(3);
        let entries = (0..30)
            .map(|i| {
                let x = i as f32;
                entry("many", i, array![1.0, (x * 0.37).sin(), (x * 0.11).cos()])
            })
            .collect();
        index.upsert_document(doc("many"), entries).unwrap();

        let query = array![0.3, 0.8, -0.2];
        for k in 1..=20 {
            let hits = index.search(&query, &SearchConfig::similarity(k)).unwrap();
            assert!(hits.len() <= k);
            assert_eq!(hits.len(), k);
            for pair in hits.windows(2) {
                assert!(pair[0].score >= pair[1].score);
            }
        }

        // Larger k is capped at the configured maximum.
        let hits = index.search(&query, &SearchConfig::similarity(25)).unwrap();
        assert_eq!(hits.len(), 20);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = index(2);
        index
            .upsert_document(doc("first"), vec![entry("first", 0, array![1.0, 1.0])])
            .unwrap();
        index
            .upsert_document(doc("second"), vec![entry("second", 0, array![1.0, 1.0])])
            .unwrap();

        let hits = index
            .search(&array![1.0, 1.0], &SearchConfig::similarity(2))
            .unwrap();
        assert_eq!(hits[0].chunk.document_id, "first");
        assert_eq!(hits[1].chunk.document_id, "second");
    }

    #[test]
    fn test_threshold_drops_low_scores() {
        let index = index(2);
        index
            .upsert_document(
                doc("a"),
                vec![
                    entry("a", 0, array![1.0, 0.0]),
                    entry("a", 1, array![0.7, 0.7]),
                    entry("a", 2, array![0.0, 1.0]),
                ],
            )
            .unwrap();

        let hits = index
            .search(&array![1.0, 0.0], &SearchConfig::threshold(10, 0.5))
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score >= 0.5));

        let none = index
            .search(&array![-1.0, 0.0], &SearchConfig::threshold(10, 0.5))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_mmr_is_deterministic_and_diverse() {
        let index = index(2);
        index
            .upsert_document(
                doc("a"),
                vec![
                    entry("a", 0, array![1.0, 0.0]),
                    entry("a", 1, array![1.0, 0.02]),
                    entry("a", 2, array![0.6, 0.8]),
                ],
            )
            .unwrap();

        let query = array![1.0, -0.2];
        let config = SearchConfig::mmr(2, 0.3);
        let first = index.search(&query, &config).unwrap();
        let second = index.search(&query, &config).unwrap();
        let seqs = |hits: &[ScoredChunk]| hits.iter().map(|h| h.chunk.sequence).collect::<Vec<_>>();
        assert_eq!(seqs(&first), seqs(&second));
        // The near-duplicate of the best hit is passed over for the distinct one.
        assert_eq!(seqs(&first), vec![0, 2]);

        let relevance_only = index.search(&query, &SearchConfig::mmr(2, 1.0)).unwrap();
        assert_eq!(seqs(&relevance_only), vec![0, 1]);
    }

    #[test]
    fn test_dimension_mismatch_rejects_whole_document() {
        let index = index(3);
        let err = index
            .upsert_document(
                doc("a"),
                vec![
                    entry("a", 0, array![1.0, 0.0, 0.0]),
                    entry("a", 1, array![1.0, 0.0]),
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Index(IndexError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert_eq!(index.stats().chunks, 0);
        assert_eq!(index.stats().documents, 0);

        let err = index
            .search(&array![1.0, 0.0], &SearchConfig::similarity(1))
            .unwrap_err();
        assert!(matches!(err, Error::Index(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_upsert_replaces_previous_version() {
        let index = index(2);
        index
            .upsert_document(
                doc("a"),
                vec![entry("a", 0, array![1.0, 0.0]), entry("a", 1, array![0.0, 1.0])],
            )
            .unwrap();
        index
            .upsert_document(doc("a"), vec![entry("a", 0, array![1.0, 1.0])])
            .unwrap();

        let snapshot = index.snapshot();
        assert_eq!(snapshot.document_count(), 1);
        assert_eq!(snapshot.chunks_of("a").len(), 1);
    }

    #[test]
    fn test_clear_and_delete() {
        let index = index(2);
        index
            .upsert_document(doc("a"), vec![entry("a", 0, array![1.0, 0.0])])
            .unwrap();
        index
            .upsert_document(doc("b"), vec![entry("b", 0, array![0.0, 1.0])])
            .unwrap();

        assert!(index.delete_document("a").unwrap());
        assert!(!index.delete_document("a").unwrap());
        assert_eq!(index.stats().documents, 1);

        index.clear().unwrap();
        let stats = index.stats();
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.chunks, 0);
        assert!(stats.version > 0);
    }

    #[test]
    fn test_persisted_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let index = VectorIndex::open(dir.path(), 2, SearchDefaults::default()).unwrap();
            index
                .upsert_document(
                    doc("a"),
                    vec![entry("a", 0, array![3.0, 4.0]), entry("a", 1, array![0.0, 1.0])],
                )
                .unwrap();
        }

        let index = VectorIndex::open(dir.path(), 2, SearchDefaults::default()).unwrap();
        assert_eq!(index.stats().chunks, 2);
        let hits = index
            .search(&array![0.6, 0.8], &SearchConfig::similarity(1))
            .unwrap();
        assert_eq!(hits[0].chunk.sequence, 0);
        assert!((hits[0].score - 1.0).abs() < 1e-5);

        // New writes continue after the persisted sequence numbers.
        index
            .upsert_document(doc("b"), vec![entry("b", 0, array![3.0, 4.0])])
            .unwrap();
        let hits = index
            .search(&array![0.6, 0.8], &SearchConfig::similarity(2))
            .unwrap();
        assert_eq!(hits[0].chunk.document_id, "a");
        assert_eq!(hits[1].chunk.document_id, "b");
    }

    #[test]
    fn test_reopen_with_other_dimension_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        VectorIndex::open(dir.path(), 4, SearchDefaults::default()).unwrap();
        let err = VectorIndex::open(dir.path(), 8, SearchDefaults::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Index(IndexError::NotInitialized(_))));
    }

    #[test]
    fn test_readers_never_see_partial_documents() {
        const CHUNKS: usize = 8;
        let index = Arc::new(index(4));
        let done = Arc::new(AtomicBool::new(false));

        let writer = {
            let index = index.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                for round in 0..2 {
                    for d in 0..20 {
                        let id = format!("doc-{}", d);
                        let entries = (0..CHUNKS)
                            .map(|c| {
                                let v = (round * 100 + d * 10 + c) as f32;
                                entry(&id, c, array![1.0, v.sin(), v.cos(), 0.5])
                            })
                            .collect();
                        index.upsert_document(doc(&id), entries).unwrap();
                    }
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = index.clone();
                let done = done.clone();
                std::thread::spawn(move || {
                    while !done.load(Ordering::SeqCst) {
                        let snapshot = index.snapshot();
                        for id in snapshot.document_ids() {
                            assert_eq!(snapshot.chunks_of(id).len(), CHUNKS);
                        }
                        assert_eq!(snapshot.chunk_count(), snapshot.document_count() * CHUNKS);
                        let hits = index
                            .search(&array![1.0, 0.0, 0.0, 0.0], &SearchConfig::similarity(20))
                            .unwrap();
                        assert!(hits.len() <= 20);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(index.stats().chunks, 20 * CHUNKS);
    }
}
