//! Word 2007+ (`.docx`): paragraphs from `word/document.xml`.

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{corrupt, read_file, DocumentFormat, DocumentLoader, TextBlock, TextBlocks};
use govrag_core::LoaderError;

/// Upper bound on the decompressed main document part.
const MAX_XML_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

pub struct DocxLoader;

impl DocumentLoader for DocxLoader {
    fn formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Docx]
    }

    fn load(&self, path: &Path) -> Result<TextBlocks, LoaderError> {
        let bytes = read_file(path)?;
        let xml = read_document_xml(&bytes).map_err(|reason| corrupt(path, reason))?;
        let paragraphs = paragraphs(&xml).map_err(|reason| corrupt(path, reason))?;
        if paragraphs.is_empty() {
            return Ok(TextBlocks::empty());
        }
        Ok(TextBlocks::from_blocks(vec![TextBlock::new(
            paragraphs.join("\n"),
            &path.display().to_string(),
            DocumentFormat::Docx,
        )]))
    }
}

fn read_document_xml(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?;
    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| e.to_string())?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err("word/document.xml exceeds size limit".into());
    }
    Ok(xml)
}

/// Non-empty paragraphs (`w:p`) with their runs (`w:t`) concatenated.
/// `w:tab` and `w:br` inside runs become a tab and a line break.
fn paragraphs(xml: &[u8]) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    // Inside paragraph properties, where `w:tab` declares tab stops.
    let mut in_props = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"pPr" => in_props = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if !in_props => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"pPr" => in_props = false,
                b"p" => {
                    let paragraph = current.trim_end();
                    if !paragraph.trim().is_empty() {
                        out.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
