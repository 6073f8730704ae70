//! Prompt context assembly.
//!
//! Merges per-document summaries and retrieved chunk texts into one system
//! prompt. Each retrieved excerpt is prefixed with `[From <document name>]`
//! so the model can attribute its answers. Repeated chunks are not
//! deduplicated and no token-budget truncation happens here; an oversized
//! context surfaces as a generation-client error downstream.

use crate::models::{DocumentSummary, RetrievedChunk};

/// Fixed instruction preamble for chat answers.
pub const SYSTEM_PREAMBLE: &str = "You are a study assistant for a student's notebook. \
Answer questions using only the document summaries and excerpts provided below. \
Cite which document your answer draws on. If the documents do not contain the \
answer, say so instead of guessing.";

/// Assemble the chat system prompt from summaries and retrieved excerpts.
pub fn assemble_system_prompt(
    summaries: &[DocumentSummary],
    retrieved: &[RetrievedChunk],
) -> String {
    let mut prompt = String::from(SYSTEM_PREAMBLE);

    prompt.push_str("\n\nDOCUMENT SUMMARIES:\n");
    for s in summaries {
        prompt.push_str(&format!("[{}] {}\n", s.display_name, s.summary));
    }

    prompt.push_str("\nRELEVANT EXCERPTS:\n");
    for chunk in retrieved {
        prompt.push_str(&format!("[From {}] {}\n", chunk.display_name, chunk.text));
    }

    prompt
}

/// Format retrieved excerpts as a standalone context block for the
/// single-shot MCQ/flashcard calls.
pub fn format_excerpts(retrieved: &[RetrievedChunk]) -> String {
    retrieved
        .iter()
        .map(|c| format!("[From {}] {}", c.display_name, c.text))
        .collect::<Vec<_>>()
        .join("\n")
}
