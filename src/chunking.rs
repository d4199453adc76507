//! Splitting extracted document text into overlapping segments.
//!
//! The chunker is the write path's first stage: a fixed window slides across
//! the text advancing by `chunk_size - overlap` characters per step, and the
//! final window is truncated to the remaining text. Boundaries are a pure
//! function of `(text, chunk_size, overlap)` — re-ingesting identical text
//! always reproduces identical chunks, which is what makes re-ingestion
//! idempotent.

use crate::error::{Error, Result};

/// A contiguous segment of a document's text.
///
/// Offsets are in characters, relative to the start of the parent
/// document's text, so a chunk can always be traced back to its source
/// span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text content.
    pub text: String,
    /// Zero-based ordinal within the document.
    pub index: usize,
    /// Character offset of the first character of this chunk.
    pub start_char: usize,
    /// Character offset one past the last character of this chunk.
    pub end_char: usize,
    /// How many leading characters this chunk shares with its predecessor.
    pub overlap_with_previous: usize,
}

impl Chunk {
    /// Chunk length in characters.
    pub fn char_len(&self) -> usize {
        self.end_char - self.start_char
    }
}

/// Split `text` into overlapping chunks.
///
/// `chunk_size` must be positive and `overlap` strictly smaller than
/// `chunk_size`; anything else is [`Error::Config`]. Empty text yields an
/// empty vector; text no longer than `chunk_size` yields exactly one chunk
/// covering all of it. Every character of `text` lands in at least one
/// chunk.
///
/// Character-based with an O(1) char→byte map, so multi-byte text never
/// splits inside a code point.
///
/// # Examples
///
/// ```
/// use lexrag::chunking::chunk_text;
///
/// let chunks = chunk_text("short clause", 100, 10).unwrap();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "short clause");
///
/// let chunks = chunk_text(&"word ".repeat(100), 100, 20).unwrap();
/// assert!(chunks.len() > 1);
/// ```
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(Error::Config("chunk_size must be positive".into()));
    }
    if overlap >= chunk_size {
        return Err(Error::Config(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Char index -> byte index, with a final sentinel for the text end.
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = char_to_byte.len() - 1;

    let step = chunk_size - overlap;
    let mut chunks = Vec::with_capacity(char_count.div_ceil(step));
    let mut start_char = 0;

    loop {
        let end_char = (start_char + chunk_size).min(char_count);
        let slice = &text[char_to_byte[start_char]..char_to_byte[end_char]];
        let index = chunks.len();
        chunks.push(Chunk {
            text: slice.to_string(),
            index,
            start_char,
            end_char,
            overlap_with_previous: if index == 0 { 0 } else { overlap },
        });
        if end_char == char_count {
            break;
        }
        start_char += step;
    }

    Ok(chunks)
}
