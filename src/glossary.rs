//! Term/definition extraction from generated glossary text.
//!
//! The generation service is asked to emit one `Term: definition` line per
//! entry, and this module parses whatever came back. The output shape is
//! validated; completeness is not — a model that ignores the format simply
//! yields fewer entries. Best-effort by design of the task, not a bug to
//! fix here.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// Longest accepted term, in characters. Lines with an over-long "term"
/// are almost always prose containing a stray colon.
const MAX_TERM_CHARS: usize = 80;

fn entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Optional list marker, bold term, colon, definition.
        Regex::new(r"(?m)^\s*(?:[-*•]\s*)?\*{0,2}([^:\n]+?)\*{0,2}\s*:\s*(.+?)\s*$")
            .expect("glossary pattern is valid")
    })
}

/// Extract `Term: definition` pairs from generated text into an ordered
/// map. The first definition wins when a term repeats.
///
/// # Examples
///
/// ```
/// use lexrag::glossary::extract_glossary;
///
/// let glossary = extract_glossary("Tort: a civil wrong.");
/// assert_eq!(glossary.get("Tort").map(String::as_str), Some("a civil wrong."));
/// ```
pub fn extract_glossary(text: &str) -> BTreeMap<String, String> {
    let mut glossary = BTreeMap::new();
    for capture in entry_pattern().captures_iter(text) {
        let term = capture[1].trim();
        let definition = capture[2].trim();
        if term.is_empty()
            || definition.is_empty()
            || term.chars().count() > MAX_TERM_CHARS
        {
            continue;
        }
        glossary
            .entry(term.to_string())
            .or_insert_with(|| definition.to_string());
    }
    glossary
}
