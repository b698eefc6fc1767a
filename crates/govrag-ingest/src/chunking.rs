//! Text chunking into bounded, overlapping segments.
//!
//! Each chunk has a *body* of at most `chunk_size - overlap` characters, cut at
//! the best boundary in the second half of the window (paragraph break, line
//! break, sentence end, whitespace) or hard-cut when there is none. Chunks
//! after the first are prefixed with up to `overlap` characters preceding their
//! body. Bodies tile the text exactly, so stripping each chunk's leading
//! overlap and concatenating gives back the input.
//!
//! All offsets count Unicode scalar values, not bytes.

use crate::loader::TextBlock;
use govrag_core::{Error, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
/// Default overlap between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Separator between blocks joined by [`Chunker::split_blocks`].
const BLOCK_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub sequence: usize,
    /// Start of `text`, including the leading overlap.
    pub char_start: usize,
    /// Start of the body; `body_start - char_start` is the overlap length.
    pub body_start: usize,
    /// End of `text` (exclusive).
    pub char_end: usize,
    pub page: Option<u32>,
}

impl TextChunk {
    /// The chunk text without its leading overlap.
    pub fn body(&self) -> &str {
        let skip = self.body_start - self.char_start;
        match self.text.char_indices().nth(skip) {
            Some((byte, _)) => &self.text[byte..],
            None => "",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }

    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let stride = self.stride();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let limit = (start + stride).min(chars.len());
            let end = if limit == chars.len() {
                limit
            } else {
                find_cut(&chars, start, limit)
            };
            let char_start = start - self.overlap.min(start);
            chunks.push(TextChunk {
                text: chars[char_start..end].iter().collect(),
                sequence: chunks.len(),
                char_start,
                body_start: start,
                char_end: end,
                page: None,
            });
            start = end;
        }
        chunks
    }

    /// Join non-empty blocks with a blank line and split the result. Each chunk
    /// takes the page of the block its body starts in.
    pub fn split_blocks(&self, blocks: &[TextBlock]) -> Vec<TextChunk> {
        let mut joined = String::new();
        let mut starts: Vec<(usize, Option<u32>)> = Vec::new();
        let mut offset = 0;

        for block in blocks.iter().filter(|b| !b.text.trim().is_empty()) {
            if !joined.is_empty() {
                joined.push_str(BLOCK_SEPARATOR);
                offset += BLOCK_SEPARATOR.len();
            }
            starts.push((offset, block.metadata.page));
            joined.push_str(&block.text);
            offset += block.text.chars().count();
        }

        let mut chunks = self.split(&joined);
        for chunk in &mut chunks {
            let idx = starts.partition_point(|(s, _)| *s <= chunk.body_start);
            chunk.page = idx.checked_sub(1).and_then(|i| starts[i].1);
        }
        chunks
    }
}

/// End of the body starting at `start`, at most `limit`.
///
/// Boundaries are tried by priority; a boundary is only taken when it leaves
/// the body longer than half the window.
fn find_cut(chars: &[char], start: usize, limit: usize) -> usize {
    let min_cut = start + (limit - start) / 2 + 1;
    if min_cut > limit {
        return limit;
    }

    let last_cut = |is_cut: &dyn Fn(usize) -> bool| (min_cut..=limit).rev().find(|&cut| is_cut(cut));

    // Paragraph break: body ends right after "\n\n".
    let paragraph = |cut: usize| cut >= start + 2 && chars[cut - 1] == '\n' && chars[cut - 2] == '\n';
    // Line break.
    let line = |cut: usize| chars[cut - 1] == '\n';
    // Sentence end followed by whitespace, which stays with the sentence.
    let sentence = |cut: usize| {
        cut >= start + 2 && chars[cut - 1].is_whitespace() && matches!(chars[cut - 2], '.' | '!' | '?')
    };
    let space = |cut: usize| chars[cut - 1].is_whitespace();

    last_cut(&paragraph)
        .or_else(|| last_cut(&line))
        .or_else(|| last_cut(&sentence))
        .or_else(|| last_cut(&space))
        .unwrap_or(limit)
}
