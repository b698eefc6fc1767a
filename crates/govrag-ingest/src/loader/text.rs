use std::path::Path;

use super::{read_file, DocumentFormat, DocumentLoader, TextBlock, TextBlocks};
use govrag_core::LoaderError;

/// Plain text and Markdown: the whole file as one block.
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
pub struct PlainTextLoader;

impl DocumentLoader for PlainTextLoader {
    fn formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Txt, DocumentFormat::Md]
    }

    fn load(&self, path: &Path) -> Result<TextBlocks, LoaderError> {
        let format = DocumentFormat::from_path(path)?;
        let bytes = read_file(path)?;
        let text = String::from_utf8_lossy(&bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        if text.trim().is_empty() {
            return Ok(TextBlocks::empty());
        }
        Ok(TextBlocks::from_blocks(vec![TextBlock::new(
            text,
            &path.display().to_string(),
            format,
        )]))
    }
}
