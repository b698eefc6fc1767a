//! Document ingestion pipeline: file → text blocks → chunks → embeddings → index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunking::{Chunker, TextChunk};
use crate::loader::{DocumentFormat, LoaderRegistry, TextBlock, TesseractCli};
use govrag_core::{EmbeddingError, Error, GovRagConfig, LoaderError, Result};
use govrag_infer::Embedder;
use govrag_store::{ChunkRecord, DocumentRecord, IndexEntry, VectorIndex};

/// Texts sent to the embedder per call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Outcome of a directory ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub documents_processed: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<IngestFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub document: String,
    pub error: String,
}

/// Runs files through loader, chunker and embedder and writes them to the index.
pub struct Ingester {
    registry: Arc<LoaderRegistry>,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    batch_size: usize,
    /// Directories never descended into (index files, staged uploads, models).
    skip_dirs: Vec<PathBuf>,
}

impl Ingester {
    pub fn new(
        registry: Arc<LoaderRegistry>,
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
    ) -> Self {
        Self {
            registry,
            chunker,
            embedder,
            index,
            batch_size: DEFAULT_BATCH_SIZE,
            skip_dirs: Vec::new(),
        }
    }

    /// Build the pipeline from configuration: default loaders with Tesseract OCR,
    /// configured chunk sizes, and the service's own data directories skipped.
    pub fn from_config(
        config: &GovRagConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
    ) -> Result<Self> {
        let ocr = Arc::new(TesseractCli::new(config.ocr_language.clone()));
        let registry = LoaderRegistry::with_defaults(ocr, config.ocr_min_chars);
        let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
        let paths = &config.data_paths;
        Ok(Self::new(Arc::new(registry), chunker, embedder, index)
            .with_batch_size(config.embedder.batch_size)
            .with_skip_dirs([&paths.vectordb, &paths.uploads, &paths.models]))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_skip_dirs<P: AsRef<Path>>(mut self, dirs: impl IntoIterator<Item = P>) -> Self {
        self.skip_dirs = dirs
            .into_iter()
            .filter_map(|d| d.as_ref().canonicalize().ok())
            .collect();
        self
    }

    pub fn registry(&self) -> &LoaderRegistry {
        &self.registry
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Ingest every supported file under `dir`, in path order.
    ///
    /// A failing document is recorded in the summary and does not stop the walk.
    pub fn ingest_directory(&self, dir: &Path, clear_existing: bool) -> Result<IngestSummary> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!(
                "Data directory not found: {}",
                dir.display()
            )));
        }
        if clear_existing {
            self.index.clear()?;
        }
        info!("Ingesting directory {}", dir.display());

        let mut summary = IngestSummary::default();
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !(entry.file_type().is_dir() && self.is_skipped(entry.path())));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    let document = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| dir.display().to_string());
                    summary.failures.push(IngestFailure {
                        document,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !self.registry.supports(path) {
                continue;
            }

            let source = path.display().to_string();
            let result = document_id_for(path).and_then(|id| self.ingest_file(path, &id, &source));
            match result {
                Ok(chunks) => {
                    summary.documents_processed += 1;
                    summary.chunks_indexed += chunks;
                }
                Err(e) => {
                    warn!("Failed to ingest {}: {}", source, e);
                    summary.failures.push(IngestFailure {
                        document: source,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Ingested {} documents ({} chunks, {} failures) from {}",
            summary.documents_processed,
            summary.chunks_indexed,
            summary.failures.len(),
            dir.display()
        );
        Ok(summary)
    }

    /// Load, chunk, embed and upsert one file under `document_id`, replacing any
    /// previous version. Returns the number of chunks indexed.
    pub fn ingest_file(&self, path: &Path, document_id: &str, source: &str) -> Result<usize> {
        let format = DocumentFormat::from_path(path)?;
        let bytes = std::fs::read(path).map_err(|source| LoaderError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let blocks: Vec<TextBlock> = self
            .registry
            .load(path)?
            .collect::<std::result::Result<_, LoaderError>>()?;
        let chunks = self.chunker.split_blocks(&blocks);
        if chunks.is_empty() {
            return Err(LoaderError::NoText(source.to_string()).into());
        }
        debug!("{} produced {} blocks, {} chunks", source, blocks.len(), chunks.len());

        let entries = self.embed_chunks(document_id, chunks)?;
        let document = DocumentRecord {
            id: document_id.to_string(),
            source: source.to_string(),
            format: format.as_str().to_string(),
            content_hash: content_hash(&bytes),
            size_bytes: bytes.len() as u64,
            ingested_at: chrono::Utc::now().timestamp_millis(),
        };
        let count = self.index.upsert_document(document, entries)?;
        info!("Indexed {} ({} chunks)", source, count);
        Ok(count)
    }

    fn embed_chunks(&self, document_id: &str, chunks: Vec<TextChunk>) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embedder.embed_documents(&texts)?;
            if embeddings.len() != batch.len() {
                return Err(EmbeddingError::Provider(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                ))
                .into());
            }
            for (chunk, embedding) in batch.iter().zip(embeddings) {
                entries.push(IndexEntry {
                    chunk: ChunkRecord {
                        document_id: document_id.to_string(),
                        sequence: chunk.sequence,
                        text: chunk.text.clone(),
                        char_start: chunk.char_start,
                        char_end: chunk.char_end,
                        page: chunk.page,
                    },
                    embedding,
                });
            }
        }
        Ok(entries)
    }

    fn is_skipped(&self, dir: &Path) -> bool {
        if self.skip_dirs.is_empty() {
            return false;
        }
        dir.canonicalize()
            .map(|c| self.skip_dirs.contains(&c))
            .unwrap_or(false)
    }
}

/// Directory-ingested documents are identified by their canonical path.
fn document_id_for(path: &Path) -> Result<String> {
    let canonical = path.canonicalize().map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(canonical.display().to_string())
}

/// Compute SHA-256 content hash.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::OcrEngine;
    use govrag_infer::HashingEmbedder;
    use govrag_store::SearchDefaults;
    use tempfile::TempDir;

    const DIM: usize = 64;

    struct NoOcr;

    impl OcrEngine for NoOcr {
        fn recognize_page(&self, pdf: &Path, _page: u32) -> std::result::Result<String, LoaderError> {
            Err(LoaderError::OcrUnavailable {
                path: pdf.display().to_string(),
                reason: "disabled in tests".into(),
            })
        }
    }

    fn ingester(embedder_dim: usize) -> Ingester {
        let registry = LoaderRegistry::with_defaults(Arc::new(NoOcr), 50);
        let index = VectorIndex::in_memory(DIM, SearchDefaults::default()).unwrap();
        Ingester::new(
            Arc::new(registry),
            Chunker::new(200, 40).unwrap(),
            Arc::new(HashingEmbedder::new(embedder_dim)),
            Arc::new(index),
        )
        .with_batch_size(2)
    }

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_ingest_directory_isolates_failures() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", &"Renovação do passaporte comum. ".repeat(20));
        write(dir.path(), "b.md", "# Certidões\n\nEmissão de segunda via.");
        write(dir.path(), "sub/c.txt", "Agendamento no posto de atendimento.");
        write(dir.path(), "empty.txt", "   \n");
        write(dir.path(), "tool.exe", "MZ binary");

        let ingester = ingester(DIM);
        let summary = ingester.ingest_directory(dir.path(), false).unwrap();

        assert_eq!(summary.documents_processed, 3);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].document.ends_with("empty.txt"));
        assert!(summary.failures[0].error.contains("No text extracted"));

        let snapshot = ingester.index().snapshot();
        assert_eq!(snapshot.document_count(), 3);
        assert_eq!(snapshot.chunk_count(), summary.chunks_indexed);
        assert!(summary.chunks_indexed > 3);
    }

    #[test]
    fn test_ocr_failure_fails_only_that_document() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "Agendamento no posto de atendimento.");
        std::fs::write(dir.path().join("b.pdf"), crate::loader::test_pdf(&[""])).unwrap();
        write(dir.path(), "c.txt", "Emissão da carteira de trabalho digital.");

        let ingester = ingester(DIM);
        let summary = ingester.ingest_directory(dir.path(), false).unwrap();

        assert_eq!(summary.documents_processed, 2);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].document.ends_with("b.pdf"));
        assert!(summary.failures[0].error.contains("OCR unavailable"), "{}", summary.failures[0].error);
        assert_eq!(ingester.index().snapshot().document_count(), 2);
    }

    #[test]
    fn test_clear_existing_keeps_only_new_documents() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write(first.path(), "old.txt", "Documento antigo sobre impostos.");
        let new_path = write(second.path(), "new.txt", "Documento novo sobre vacinação.");

        let ingester = ingester(DIM);
        ingester.ingest_directory(first.path(), false).unwrap();
        let summary = ingester.ingest_directory(second.path(), true).unwrap();
        assert_eq!(summary.documents_processed, 1);

        let snapshot = ingester.index().snapshot();
        let ids: Vec<&str> = snapshot.document_ids().collect();
        let expected = new_path.canonicalize().unwrap().display().to_string();
        assert_eq!(ids, vec![expected.as_str()]);
        assert_eq!(snapshot.chunk_count(), summary.chunks_indexed);
    }

    #[test]
    fn test_reingest_replaces_previous_version() {
        let dir = TempDir::new().unwrap();
        let path = write(dir.path(), "guia.txt", &"Primeira versão do guia. ".repeat(30));

        let ingester = ingester(DIM);
        let first = ingester.ingest_file(&path, "guia", "guia.txt").unwrap();
        assert!(first > 1);

        std::fs::write(&path, "Versão curta.").unwrap();
        assert_eq!(ingester.ingest_file(&path, "guia", "guia.txt").unwrap(), 1);

        let snapshot = ingester.index().snapshot();
        assert_eq!(snapshot.chunk_count(), 1);
        let document = snapshot.document("guia").unwrap();
        assert_eq!(document.format, "txt");
        assert_eq!(document.size_bytes, "Versão curta.".len() as u64);
        assert_eq!(document.content_hash, content_hash("Versão curta.".as_bytes()));
    }

    #[test]
    fn test_skip_dirs_are_not_walked() {
        let root = TempDir::new().unwrap();
        write(root.path(), "documents/servico.txt", "Serviço público digital.");
        write(root.path(), "uploads/job/staged.txt", "Arquivo em processamento.");

        let ingester = ingester(DIM).with_skip_dirs([root.path().join("uploads")]);
        let summary = ingester.ingest_directory(root.path(), false).unwrap();
        assert_eq!(summary.documents_processed, 1);
        assert!(summary.failures.is_empty());
    }

    #[test]
    fn test_missing_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ingester(DIM)
            .ingest_directory(&dir.path().join("missing"), true)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_dimension_mismatch_is_recorded() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "Texto qualquer para indexar.");

        let ingester = ingester(DIM / 2);
        let summary = ingester.ingest_directory(dir.path(), false).unwrap();
        assert_eq!(summary.documents_processed, 0);
        assert!(summary.failures[0].error.contains("Dimension mismatch"));
        assert!(ingester.index().is_empty());
    }
}
