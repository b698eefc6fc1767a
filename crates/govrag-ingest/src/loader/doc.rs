//! Word 97-2003 (`.doc`) best-effort text recovery.
//!
//! The binary format stores the document text either as UTF-16LE or as
//! 8-bit code-page text inside an OLE compound file. Rather than parse the
//! piece table, readable runs of both encodings are scanned in file order.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::bytes::Regex;

use super::{corrupt, read_file, DocumentFormat, DocumentLoader, TextBlock, TextBlocks};
use govrag_core::LoaderError;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Printable Latin-1 characters encoded as UTF-16LE, at least 8 in a row.
static UTF16_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)(?:[\x09\x0A\x0D\x20-\x7E\xA0-\xFF]\x00){8,}").expect("valid UTF-16 run pattern")
});

/// Printable 8-bit characters, at least 8 in a row.
static BYTE_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?-u)[\x09\x0A\x0D\x20-\x7E\xA0-\xFF]{8,}").expect("valid byte run pattern")
});

pub struct LegacyDocLoader;

impl DocumentLoader for LegacyDocLoader {
    fn formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Doc]
    }

    fn load(&self, path: &Path) -> Result<TextBlocks, LoaderError> {
        let bytes = read_file(path)?;
        if !bytes.starts_with(&OLE_MAGIC) {
            return Err(corrupt(path, "not an OLE compound document"));
        }
        let text = recover_text(&bytes);
        if text.trim().is_empty() {
            return Ok(TextBlocks::empty());
        }
        Ok(TextBlocks::from_blocks(vec![TextBlock::new(
            text,
            &path.display().to_string(),
            DocumentFormat::Doc,
        )]))
    }
}

/// Readable runs of both encodings in file order, one per line.
fn recover_text(bytes: &[u8]) -> String {
    let mut runs: Vec<(usize, String)> = Vec::new();

    for m in UTF16_RUN.find_iter(bytes) {
        let text: String = m.as_bytes().iter().step_by(2).map(|&b| b as char).collect();
        runs.push((m.start(), text));
    }
    for m in BYTE_RUN.find_iter(bytes) {
        let text: String = m.as_bytes().iter().map(|&b| b as char).collect();
        runs.push((m.start(), text));
    }
    runs.sort_by_key(|(offset, _)| *offset);

    runs.into_iter()
        .map(|(_, text)| normalize_line_breaks(&text))
        .filter(|text| looks_like_prose(text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Word uses a bare `\r` as paragraph mark.
fn normalize_line_breaks(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// Filters out binary noise that happens to be printable: mostly letters and spaces.
fn looks_like_prose(text: &str) -> bool {
    let total = text.chars().count();
    if total < 8 {
        return false;
    }
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let wordish = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || ",.;:!?-()".contains(*c))
        .count();
    letters * 2 >= total && wordish * 10 >= total * 9 && text.contains(' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn utf16(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn test_recovers_utf16_and_byte_runs_in_order() {
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8, 1, 2, 3, 0x05, 0x00]);
        bytes.extend(utf16("Atendimento ao cidadão\r"));
        bytes.extend_from_slice(&[0x00, 0x00, 0x07, 0x01]);
        bytes.extend_from_slice(b"Horario de funcionamento das 8h as 17h");
        bytes.extend_from_slice(&[0x00, 0x13, 0x88]);
        bytes.extend_from_slice(b"\x01\x02Xq7#k9@Lz&%"); // noise

        let text = recover_text(&bytes);
        assert_eq!(
            text,
            "Atendimento ao cidadão\nHorario de funcionamento das 8h as 17h"
        );
    }

    #[test]
    fn test_rejects_non_ole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fake.doc");
        std::fs::write(&path, b"{\\rtf1 not a word binary}").unwrap();
        assert!(matches!(
            LegacyDocLoader.load(&path).err().unwrap(),
            LoaderError::CorruptFile { .. }
        ));
    }

    #[test]
    fn test_loads_block_from_ole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("antigo.doc");
        let mut bytes = OLE_MAGIC.to_vec();
        bytes.extend(utf16("Segunda via de documentos"));
        std::fs::write(&path, &bytes).unwrap();

        let blocks: Vec<_> = LegacyDocLoader.load(&path).unwrap().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].as_ref().unwrap().text, "Segunda via de documentos");
    }
}
