//! Format-polymorphic document loading.
//!
//! Each format family has one [`DocumentLoader`]; the [`LoaderRegistry`] picks
//! it by file extension. Loaders return [`TextBlocks`], a lazy sequence so that
//! expensive per-page work (OCR) only runs when the block is pulled.

mod doc;
mod ocr;
mod ooxml;
mod pdf;
mod sheet;
mod text;

pub use doc::LegacyDocLoader;
pub use ocr::{OcrEngine, TesseractCli};
pub use ooxml::DocxLoader;
pub use pdf::PdfLoader;
pub use sheet::SpreadsheetLoader;
pub use text::PlainTextLoader;

#[cfg(test)]
pub(crate) use pdf::test_pdf;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use govrag_core::LoaderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Doc,
    Docx,
    Xls,
    Xlsx,
    Txt,
    Md,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 7] = [
        Self::Pdf,
        Self::Doc,
        Self::Docx,
        Self::Xls,
        Self::Xlsx,
        Self::Txt,
        Self::Md,
    ];

    /// Case-insensitive extension lookup (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "xls" => Some(Self::Xls),
            "xlsx" => Some(Self::Xlsx),
            "txt" => Some(Self::Txt),
            "md" => Some(Self::Md),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, LoaderError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(ext).ok_or_else(|| {
            LoaderError::UnsupportedFormat(if ext.is_empty() {
                format!("{} (no extension)", path.display())
            } else {
                format!(".{}", ext)
            })
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
            Self::Txt => "txt",
            Self::Md => "md",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub source: String,
    pub format: DocumentFormat,
    /// 1-based page number, for paged formats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Sheet or section name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub metadata: BlockMetadata,
}

impl TextBlock {
    pub fn new(text: impl Into<String>, source: &str, format: DocumentFormat) -> Self {
        Self {
            text: text.into(),
            metadata: BlockMetadata {
                source: source.to_string(),
                format,
                page: None,
                section: None,
            },
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.metadata.page = Some(page);
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.metadata.section = Some(section.into());
        self
    }
}

/// Lazy, finite, single-pass sequence of text blocks.
pub struct TextBlocks {
    inner: Box<dyn Iterator<Item = Result<TextBlock, LoaderError>>>,
}

impl TextBlocks {
    pub fn new(iter: impl Iterator<Item = Result<TextBlock, LoaderError>> + 'static) -> Self {
        Self {
            inner: Box::new(iter),
        }
    }

    pub fn from_blocks(blocks: Vec<TextBlock>) -> Self {
        Self::new(blocks.into_iter().map(Ok))
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }
}

impl Iterator for TextBlocks {
    type Item = Result<TextBlock, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Turns one file into text blocks.
pub trait DocumentLoader: Send + Sync {
    /// Formats this loader handles.
    fn formats(&self) -> &[DocumentFormat];

    fn load(&self, path: &Path) -> Result<TextBlocks, LoaderError>;
}

/// Extension → loader dispatch.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: HashMap<DocumentFormat, Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in loaders, OCR through `ocr` for pages below `ocr_min_chars`.
    pub fn with_defaults(ocr: Arc<dyn OcrEngine>, ocr_min_chars: usize) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PdfLoader::new(ocr, ocr_min_chars)));
        registry.register(Arc::new(DocxLoader));
        registry.register(Arc::new(LegacyDocLoader));
        registry.register(Arc::new(SpreadsheetLoader));
        registry.register(Arc::new(PlainTextLoader));
        registry
    }

    /// Register `loader` for every format it declares, replacing earlier ones.
    pub fn register(&mut self, loader: Arc<dyn DocumentLoader>) {
        for format in loader.formats() {
            self.loaders.insert(*format, loader.clone());
        }
    }

    pub fn supports(&self, path: &Path) -> bool {
        DocumentFormat::from_path(path)
            .map(|f| self.loaders.contains_key(&f))
            .unwrap_or(false)
    }

    pub fn loader_for(&self, path: &Path) -> Result<Arc<dyn DocumentLoader>, LoaderError> {
        let format = DocumentFormat::from_path(path)?;
        self.loaders
            .get(&format)
            .cloned()
            .ok_or_else(|| LoaderError::UnsupportedFormat(format!(".{}", format)))
    }

    pub fn load(&self, path: &Path) -> Result<TextBlocks, LoaderError> {
        self.loader_for(path)?.load(path)
    }
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>, LoaderError> {
    std::fs::read(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn corrupt(path: &Path, reason: impl fmt::Display) -> LoaderError {
    LoaderError::CorruptFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
