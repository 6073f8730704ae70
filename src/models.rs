//! Core data models used throughout Notebook Engine.
//!
//! These types represent the documents, chunks, vectors, and generated
//! artifacts that flow through the ingestion and generation pipeline.

use serde::{Deserialize, Serialize};

/// A source document after fetch + text extraction, before chunking.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Opaque storage key (e.g. `uploads/abc123/math.pdf`).
    pub key: String,
    /// Display name derived from the key's path tail (e.g. `math.pdf`).
    pub display_name: String,
    /// Full extracted text, whitespace-trimmed and blank-page-filtered.
    pub text: String,
    /// Prefix of the text (~500 chars) used as the document summary in prompts.
    pub summary: String,
}

/// An overlapping segment of a document's extracted text.
///
/// Chunks are immutable once created; re-ingesting a document regenerates
/// them wholesale.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Synthetic id: `{source_key}-{index}`.
    pub id: String,
    /// Back-reference to the originating storage key.
    pub source_key: String,
    /// Position within the document, starting at 0.
    pub index: i64,
    pub text: String,
}

/// A (id, vector, metadata) triple to be upserted into the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    /// The originating storage key, stored as metadata.
    pub source: String,
}

/// A top-K similarity match returned from a namespace query.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub score: f32,
    pub text: String,
    pub source: String,
}

/// Per-document summary fed into the prompt context.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub key: String,
    pub display_name: String,
    pub summary: String,
}

/// A retrieved chunk tagged with the display name of its source document.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub display_name: String,
    pub text: String,
}

/// A single chat turn (user, assistant, or system).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// A validated multiple-choice question.
///
/// Invariants (enforced by [`crate::validate`]): `options` has exactly 4
/// entries and `correct_answer` is one of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McqQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
}

/// A validated flashcard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}
