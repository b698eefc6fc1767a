//! GovRAG Ingest — document loaders, chunking and the ingestion pipeline.

pub mod chunking;
pub mod ingest;
pub mod loader;

pub use chunking::{Chunker, TextChunk};
pub use ingest::{content_hash, IngestFailure, IngestSummary, Ingester};
pub use loader::{
    DocumentFormat, DocumentLoader, LoaderRegistry, OcrEngine, TesseractCli, TextBlock, TextBlocks,
};
