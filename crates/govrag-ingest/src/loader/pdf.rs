use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{corrupt, read_file, DocumentFormat, DocumentLoader, OcrEngine, TextBlock, TextBlocks};
use govrag_core::LoaderError;

/// PDF text layer per page, with OCR for pages that have (almost) none.
pub struct PdfLoader {
    ocr: Arc<dyn OcrEngine>,
    /// Pages with fewer non-whitespace characters are OCRed.
    ocr_min_chars: usize,
}

impl PdfLoader {
    pub fn new(ocr: Arc<dyn OcrEngine>, ocr_min_chars: usize) -> Self {
        Self { ocr, ocr_min_chars }
    }
}

impl DocumentLoader for PdfLoader {
    fn formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Pdf]
    }

    fn load(&self, path: &Path) -> Result<TextBlocks, LoaderError> {
        let bytes = read_file(path)?;
        // pdf-extract panics on some malformed inputs.
        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(&bytes))
            .map_err(|_| corrupt(path, "PDF parser panicked"))?
            .map_err(|e| corrupt(path, e))?;
        debug!("PDF {} has {} pages", path.display(), pages.len());

        let ocr = self.ocr.clone();
        let min_chars = self.ocr_min_chars;
        let pdf: PathBuf = path.to_path_buf();
        let source = path.display().to_string();

        let blocks = pages.into_iter().enumerate().map(move |(i, text)| {
            let page = i as u32 + 1;
            let visible = text.chars().filter(|c| !c.is_whitespace()).count();
            let text = if visible < min_chars {
                debug!("Page {} of {} has {} chars; running OCR", page, source, visible);
                match ocr.recognize_page(&pdf, page) {
                    Ok(recognized) => recognized,
                    Err(e) => {
                        warn!("OCR failed for page {} of {}: {}", page, source, e);
                        return Err(e);
                    }
                }
            } else {
                text
            };
            Ok(TextBlock::new(text, &source, DocumentFormat::Pdf).with_page(page))
        });
        Ok(TextBlocks::new(blocks))
    }
}

/// Minimal PDF with one Helvetica text line per page; an empty string gives a
/// page with no text layer.
#[cfg(test)]
pub(crate) fn test_pdf(pages: &[&str]) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        String::new(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
    ];
    let mut kids = Vec::new();
    for text in pages {
        let page_id = objects.len() + 1;
        kids.push(format!("{} 0 R", page_id));
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            page_id + 1
        ));
        let content = if text.is_empty() {
            "q Q".to_string()
        } else {
            format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", text)
        };
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ));
    }
    objects[1] = format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    );

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    const PAGE_TEXT: &str = "Carteira de identidade emitida no posto de atendimento";

    struct CountingOcr(AtomicU32);

    impl OcrEngine for CountingOcr {
        fn recognize_page(&self, _pdf: &Path, _page: u32) -> Result<String, LoaderError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("recognized".into())
        }
    }

    struct FailingOcr;

    impl OcrEngine for FailingOcr {
        fn recognize_page(&self, pdf: &Path, _page: u32) -> Result<String, LoaderError> {
            Err(LoaderError::OcrUnavailable {
                path: pdf.display().to_string(),
                reason: "tesseract not installed".into(),
            })
        }
    }

    fn write_pdf(dir: &TempDir, pages: &[&str]) -> PathBuf {
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, test_pdf(pages)).unwrap();
        path
    }

    #[test]
    fn test_only_pages_without_text_are_ocred() {
        let dir = TempDir::new().unwrap();
        let path = write_pdf(&dir, &[PAGE_TEXT, ""]);
        let ocr = Arc::new(CountingOcr(AtomicU32::new(0)));

        let blocks = PdfLoader::new(ocr.clone(), 10).load(&path).unwrap();
        // Nothing is recognized until blocks are pulled.
        assert_eq!(ocr.0.load(Ordering::SeqCst), 0);

        let blocks: Vec<TextBlock> = blocks.collect::<Result<_, _>>().unwrap();
        assert_eq!(ocr.0.load(Ordering::SeqCst), 1);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].metadata.page, Some(1));
        assert!(blocks[0].text.contains("identidade"), "{:?}", blocks[0].text);
        assert_eq!(blocks[1].metadata.page, Some(2));
        assert_eq!(blocks[1].text, "recognized");
        assert_eq!(blocks[1].metadata.format, DocumentFormat::Pdf);
    }

    #[test]
    fn test_threshold_controls_ocr() {
        let dir = TempDir::new().unwrap();
        let path = write_pdf(&dir, &["", ""]);

        let ocr = Arc::new(CountingOcr(AtomicU32::new(0)));
        let blocks: Vec<TextBlock> = PdfLoader::new(ocr.clone(), 0)
            .load(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(ocr.0.load(Ordering::SeqCst), 0);

        let blocks: Vec<TextBlock> = PdfLoader::new(ocr.clone(), 1)
            .load(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ocr.0.load(Ordering::SeqCst), 2);
        assert!(blocks.iter().all(|b| b.text == "recognized"));
    }

    #[test]
    fn test_ocr_failure_surfaces_as_block_error() {
        let dir = TempDir::new().unwrap();
        let path = write_pdf(&dir, &[PAGE_TEXT, ""]);

        let mut blocks = PdfLoader::new(Arc::new(FailingOcr), 10).load(&path).unwrap();
        let first = blocks.next().unwrap().unwrap();
        assert_eq!(first.metadata.page, Some(1));

        let err = blocks.next().unwrap().unwrap_err();
        assert!(matches!(err, LoaderError::OcrUnavailable { ref reason, .. } if reason.contains("tesseract")));
        assert!(blocks.next().is_none());
    }

    #[test]
    fn test_garbage_is_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let ocr = Arc::new(CountingOcr(AtomicU32::new(0)));
        let err = PdfLoader::new(ocr.clone(), 50).load(&path).err().unwrap();
        assert!(matches!(err, LoaderError::CorruptFile { .. }));
        assert_eq!(ocr.0.load(Ordering::SeqCst), 0);
    }
}
