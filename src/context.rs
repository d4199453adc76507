//! Packing retrieved passages into a bounded context window.

use crate::{doc_id::ChunkId, retriever::Passage};

/// A passage as it was packed into a [`ContextWindow`], possibly truncated
/// to fit the remaining budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPassage {
    pub chunk_id: ChunkId,
    pub document: String,
    pub chunk_index: u32,
    pub text: String,
    pub score: f32,
    pub truncated: bool,
}

/// An ordered bundle of passages whose combined text never exceeds the
/// budget it was assembled under.
///
/// The budget counts passage characters only; separators added by
/// [`ContextWindow::render`] are not billed against it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextWindow {
    passages: Vec<ContextPassage>,
    char_len: usize,
    budget: usize,
}

impl ContextWindow {
    pub fn passages(&self) -> &[ContextPassage] {
        &self.passages
    }

    /// Total packed passage text in characters.
    pub fn char_len(&self) -> usize {
        self.char_len
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Join the packed passages for prompt embedding, labeling each with
    /// its source document.
    pub fn render(&self) -> String {
        self.passages
            .iter()
            .map(|p| format!("[{} §{}] {}", p.document, p.chunk_index, p.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Greedily pack score-ordered passages into a window of at most
/// `max_chars` characters.
///
/// Passages are taken in their given order. One that no longer fits whole
/// is truncated to the remaining budget when at least `min_fragment_len`
/// characters would survive; otherwise it is dropped and the scan
/// continues, so a shorter lower-ranked passage may still use the slack.
/// Truncation is character-based and never splits a code point.
///
/// # Examples
///
/// ```
/// use lexrag::context::assemble;
///
/// let window = assemble(&[], 100, 10);
/// assert!(window.is_empty());
/// assert_eq!(window.budget(), 100);
/// ```
pub fn assemble(
    passages: &[Passage],
    max_chars: usize,
    min_fragment_len: usize,
) -> ContextWindow {
    let mut packed = Vec::new();
    let mut used = 0usize;

    for passage in passages {
        let remaining = max_chars - used;
        if remaining == 0 {
            break;
        }
        let len = passage.text.chars().count();

        if len <= remaining {
            packed.push(ContextPassage {
                chunk_id: passage.chunk_id,
                document: passage.document.clone(),
                chunk_index: passage.chunk_index,
                text: passage.text.clone(),
                score: passage.score,
                truncated: false,
            });
            used += len;
        } else if remaining >= min_fragment_len {
            let text: String =
                passage.text.chars().take(remaining).collect();
            packed.push(ContextPassage {
                chunk_id: passage.chunk_id,
                document: passage.document.clone(),
                chunk_index: passage.chunk_index,
                text,
                score: passage.score,
                truncated: true,
            });
            used = max_chars;
        }
        // Too little room for a viable fragment: skip and keep scanning.
    }

    ContextWindow {
        passages: packed,
        char_len: used,
        budget: max_chars,
    }
}
