//! Prompt construction and generation orchestration.
//!
//! Each task gets its own template embedding the assembled context and the
//! query, the external service completes it once (no internal retries),
//! and task-specific post-processing shapes the output: the glossary task
//! parses `Term: definition` lines, the suggested-questions helper parses
//! a numbered list.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::{
    context::ContextWindow,
    error::Result,
    generation::{self, GenerationService},
    glossary,
};

/// The four generation tasks the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Answer,
    Summarize,
    Suggest,
    Glossary,
}

/// Output of [`generate`], shaped per task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Text(String),
    Glossary(BTreeMap<String, String>),
}

impl TaskOutput {
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Glossary(map) => map
                .into_iter()
                .map(|(term, definition)| format!("{term}: {definition}"))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Questions used to top up suggestions when the model yields too few
/// usable ones.
pub const FALLBACK_QUESTIONS: [&str; 10] = [
    "What is the main purpose of this document?",
    "Who enforces this document?",
    "When does it take effect?",
    "Who benefits from it?",
    "What penalties are included?",
    "What rights are guaranteed?",
    "Which authority oversees compliance?",
    "What is the scope of the document?",
    "Are there any exceptions?",
    "How are key terms defined?",
];

/// Word cap for a usable suggested question.
const MAX_QUESTION_WORDS: usize = 12;

/// Build the prompt for a task over an assembled context window.
///
/// `draft` is only consulted by [`TaskKind::Suggest`].
pub fn build_prompt(
    task: TaskKind,
    query: &str,
    draft: Option<&str>,
    window: &ContextWindow,
) -> String {
    let context = if window.is_empty() {
        "(no passages retrieved)".to_string()
    } else {
        window.render()
    };

    match task {
        TaskKind::Answer => format!(
            "You are a legal research assistant. Answer the question using \
             only the passages below. If the passages do not contain the \
             answer, say so.\n\nPassages:\n{context}\n\nQuestion: {query}\n\
             Answer:"
        ),
        TaskKind::Summarize => format!(
            "You are a legal research assistant. Summarize the passages \
             below in plain language, keeping defined terms and obligations \
             intact.\n\nPassages:\n{context}\n\nScope: {query}\n\nSummary:"
        ),
        TaskKind::Suggest => {
            let draft = draft.unwrap_or("");
            format!(
                "You are a legal drafting assistant. Using the passages \
                 below, suggest an improved continuation of the draft that \
                 addresses the request.\n\nPassages:\n{context}\n\n\
                 Request: {query}\n\nDraft:\n{draft}\n\nSuggestion:"
            )
        }
        TaskKind::Glossary => format!(
            "You are a legal research assistant. List the key legal terms \
             appearing in the passages below. Output one entry per line in \
             the exact form `Term: definition`, with no other text.\n\n\
             Passages:\n{context}\n\nScope: {query}\n\nGlossary:"
        ),
    }
}

/// Run one generation task: build the prompt, invoke the external service
/// under the deadline, post-process per task.
pub async fn generate(
    service: &dyn GenerationService,
    task: TaskKind,
    query: &str,
    draft: Option<&str>,
    window: &ContextWindow,
    timeout: Duration,
) -> Result<TaskOutput> {
    let prompt = build_prompt(task, query, draft, window);
    let raw =
        generation::complete_with_timeout(service, &prompt, timeout).await?;
    tracing::debug!(?task, generated_chars = raw.len(), "generation complete");

    Ok(match task {
        TaskKind::Glossary => {
            TaskOutput::Glossary(glossary::extract_glossary(&raw))
        }
        _ => TaskOutput::Text(raw.trim().to_string()),
    })
}

/// Prompt for the suggested-questions helper.
pub fn build_questions_prompt(window: &ContextWindow, count: usize) -> String {
    format!(
        "You are given part of a legal document.\n\nTask: generate exactly \
         {count} unique FAQ-style questions based only on this text.\n\n\
         Rules:\n- Each question must be under {MAX_QUESTION_WORDS} words.\n\
         - Cover purpose, scope, authority, penalties, rights, dates, \
         definitions.\n- Output only a numbered list (1-{count}), no other \
         text.\n\nText:\n{}\n\nQuestions:",
        window.render()
    )
}

fn numbered_item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\s*\d+[.)]\s*(.+?)\s*$")
            .expect("numbered list pattern is valid")
    })
}

/// Parse suggested questions out of generated text, topping up from
/// [`FALLBACK_QUESTIONS`] to reach `limit`.
///
/// Accepts `1.` and `1)` list markers; falls back to treating every
/// non-empty line as a candidate when no numbered list is found. A usable
/// question has at most twelve words and ends with `?`.
pub fn parse_suggested_questions(raw: &str, limit: usize) -> Vec<String> {
    let mut questions: Vec<String> = numbered_item_pattern()
        .captures_iter(raw)
        .map(|c| c[1].trim().to_string())
        .collect();

    if questions.is_empty() {
        questions = raw
            .lines()
            .map(|line| {
                line.trim_matches(|c: char| {
                    c.is_whitespace()
                        || c.is_ascii_digit()
                        || matches!(c, '-' | '•' | '*' | '.' | ')')
                })
                .to_string()
            })
            .filter(|line| !line.is_empty())
            .collect();
    }

    let mut usable: Vec<String> = questions
        .into_iter()
        .filter(|q| {
            q.ends_with('?')
                && q.split_whitespace().count() <= MAX_QUESTION_WORDS
        })
        .collect();
    usable.dedup();
    usable.truncate(limit);

    for fallback in FALLBACK_QUESTIONS {
        if usable.len() >= limit {
            break;
        }
        if !usable.iter().any(|q| q == fallback) {
            usable.push(fallback.to_string());
        }
    }
    usable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::assemble;
    use crate::mock::CannedGenerator;

    fn window_with(text: &str) -> ContextWindow {
        use crate::doc_id::{ChunkId, DocumentId};
        use crate::retriever::Passage;

        let id = DocumentId::new("doc");
        assemble(
            &[Passage {
                chunk_id: ChunkId::new(&id, 0),
                document: "doc".to_string(),
                chunk_index: 0,
                text: text.to_string(),
                score: 0.9,
            }],
            10_000,
            10,
        )
    }

    #[test]
    fn answer_prompt_embeds_context_and_query() {
        let window = window_with("the deposit is refundable");
        let prompt = build_prompt(
            TaskKind::Answer,
            "is the deposit refundable?",
            None,
            &window,
        );
        assert!(prompt.contains("the deposit is refundable"));
        assert!(prompt.contains("is the deposit refundable?"));
    }

    #[test]
    fn suggest_prompt_includes_draft() {
        let window = window_with("notice must be written");
        let prompt = build_prompt(
            TaskKind::Suggest,
            "tighten the notice clause",
            Some("Notice may be given verbally."),
            &window,
        );
        assert!(prompt.contains("Notice may be given verbally."));
    }

    #[test]
    fn empty_window_prompt_says_so() {
        let window = assemble(&[], 100, 10);
        let prompt = build_prompt(TaskKind::Answer, "anything", None, &window);
        assert!(prompt.contains("(no passages retrieved)"));
    }

    #[tokio::test]
    async fn glossary_task_extracts_mapping() {
        let service =
            CannedGenerator::new("Tort: a civil wrong.\nLien: a claim.");
        let window = window_with("Tort means a civil wrong.");
        let output = generate(
            &service,
            TaskKind::Glossary,
            "glossary",
            None,
            &window,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        match output {
            TaskOutput::Glossary(map) => {
                assert_eq!(map["Tort"], "a civil wrong.");
                assert_eq!(map["Lien"], "a claim.");
            }
            TaskOutput::Text(_) => panic!("expected glossary output"),
        }
    }

    #[tokio::test]
    async fn answer_task_returns_trimmed_text() {
        let service = CannedGenerator::new("  The deposit is refundable.\n");
        let window = window_with("the deposit is refundable");
        let output = generate(
            &service,
            TaskKind::Answer,
            "is it refundable?",
            None,
            &window,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(
            output.into_text(),
            "The deposit is refundable."
        );
    }

    #[test]
    fn parses_numbered_questions() {
        let raw = "1. What is the purpose?\n2) Who enforces it?\n3. This one \
                   is not a question";
        let questions = parse_suggested_questions(raw, 2);
        assert_eq!(
            questions,
            vec![
                "What is the purpose?".to_string(),
                "Who enforces it?".to_string(),
            ]
        );
    }

    #[test]
    fn falls_back_to_plain_lines() {
        let raw = "- What is covered?\n- Who pays the fee?";
        let questions = parse_suggested_questions(raw, 2);
        assert_eq!(
            questions,
            vec![
                "What is covered?".to_string(),
                "Who pays the fee?".to_string(),
            ]
        );
    }

    #[test]
    fn filters_long_and_unterminated_lines() {
        let raw = "1. This extremely long question keeps going and going and \
                   going far past the cap?\n2. No question mark here";
        let questions = parse_suggested_questions(raw, 5);
        // Both model lines are unusable; fallbacks fill the quota.
        assert_eq!(questions.len(), 5);
        assert!(questions.iter().all(|q| q.ends_with('?')));
        assert_eq!(questions[0], FALLBACK_QUESTIONS[0]);
    }

    #[test]
    fn tops_up_to_limit_with_fallbacks() {
        let raw = "1. What is the scope?";
        let questions = parse_suggested_questions(raw, 4);
        assert_eq!(questions.len(), 4);
        assert_eq!(questions[0], "What is the scope?");
    }

    #[test]
    fn glossary_output_renders_as_text() {
        let mut map = BTreeMap::new();
        map.insert("Tort".to_string(), "a civil wrong.".to_string());
        assert_eq!(
            TaskOutput::Glossary(map).into_text(),
            "Tort: a civil wrong."
        );
    }
}
