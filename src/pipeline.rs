//! The ingestion and generation pipeline.
//!
//! Every generation request runs the same front half: fetch the selected
//! documents, extract text, chunk, embed, and upsert into per-document
//! namespaces. The back half then diverges per route: chat retrieves against
//! the question and streams a completion; MCQ and flashcards retrieve
//! against each document's own summary and run two single-shot calls
//! (topics, then the artifact) through strict validation.
//!
//! Document loading is best-effort (a bad document is skipped), but once a
//! document is in, its embedding is all-or-nothing: any failed batch fails
//! the whole request rather than indexing a partial document.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures_util::future::try_join_all;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::context::{assemble_system_prompt, format_excerpts};
use crate::embedding::{create_embedder, embed_query, Embedder};
use crate::generation::{
    create_model, generate_flashcards, generate_mcq, generate_topics, ChatModel, ChatStream,
    CompletionHook, CompletionRequest,
};
use crate::index::{create_index, namespace_for_key, VectorIndex};
use crate::loader::{display_name, load_documents};
use crate::models::{
    ChatMessage, DocumentSummary, Flashcard, McqQuestion, RetrievedChunk, VectorEntry,
};
use crate::object_store::{create_store, ObjectStore};

/// Request failures that are the caller's fault rather than the backend's.
///
/// Kept as a typed error so the HTTP layer can map these to 400 by
/// downcast instead of by matching on message text.
#[derive(Debug, PartialEq)]
pub enum PipelineError {
    /// No selected document yielded any text.
    NoContent,
    /// The chat history contains no user turn to answer.
    NoUserMessage,
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::NoContent => {
                write!(f, "No content could be extracted from the provided documents")
            }
            PipelineError::NoUserMessage => write!(f, "Chat history contains no user message"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Result of the ingestion front half.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// One summary per successfully loaded document, in request order.
    pub documents: Vec<DocumentSummary>,
    /// Keys that were requested but could not be loaded.
    pub skipped: usize,
    /// Total chunks upserted across all documents.
    pub chunks_indexed: usize,
}

pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    model: Arc<dyn ChatModel>,
    config: Config,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn ChatModel>,
        config: Config,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            model,
            config,
        }
    }

    /// Wire up all providers from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            create_store(config)?,
            create_embedder(&config.embedding)?,
            create_index(config)?,
            create_model(&config.generation)?,
            config.clone(),
        ))
    }

    /// Wall-clock budget for one structured generation request.
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.config.pipeline.timeout_secs)
    }

    /// Front half: load, chunk, embed, and index the given documents.
    ///
    /// Unloadable documents are skipped. Embedding failures abort the whole
    /// call; the affected document's namespace receives nothing.
    pub async fn ingest(&self, keys: &[String]) -> Result<IngestReport> {
        let docs = load_documents(self.store.as_ref(), keys).await;
        let skipped = keys.len() - docs.len();

        let mut chunks_indexed = 0;
        let mut documents = Vec::with_capacity(docs.len());

        for doc in &docs {
            let chunks = chunk_text(
                &doc.key,
                &doc.text,
                self.config.chunking.chunk_size,
                self.config.chunking.overlap,
            );

            // Batches run concurrently; one failure fails them all.
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let batch_futures = texts
                .chunks(self.config.embedding.batch_size.max(1))
                .map(|batch| self.embedder.embed(batch));
            let vectors: Vec<Vec<f32>> = try_join_all(batch_futures)
                .await?
                .into_iter()
                .flatten()
                .collect();

            if vectors.len() != chunks.len() {
                bail!(
                    "Embedder returned {} vectors for {} chunks of '{}'",
                    vectors.len(),
                    chunks.len(),
                    doc.key
                );
            }

            let entries: Vec<VectorEntry> = chunks
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorEntry {
                    id: chunk.id.clone(),
                    vector,
                    text: chunk.text.clone(),
                    source: chunk.source_key.clone(),
                })
                .collect();

            chunks_indexed += entries.len();
            self.index
                .upsert(&namespace_for_key(&doc.key), entries)
                .await?;

            documents.push(DocumentSummary {
                key: doc.key.clone(),
                display_name: doc.display_name.clone(),
                summary: doc.summary.clone(),
            });
        }

        Ok(IngestReport {
            documents,
            skipped,
            chunks_indexed,
        })
    }

    /// Retrieve chat context: the question embedded once, then each
    /// document's namespace queried in request order.
    async fn retrieve_for_chat(
        &self,
        documents: &[DocumentSummary],
        question: &str,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_vector = embed_query(self.embedder.as_ref(), question).await?;

        let mut retrieved = Vec::new();
        for doc in documents {
            let matches = self
                .index
                .query(
                    &namespace_for_key(&doc.key),
                    &query_vector,
                    self.config.retrieval.chat_top_k,
                )
                .await?;
            retrieved.extend(matches.into_iter().map(|m| RetrievedChunk {
                display_name: display_name(&m.source),
                text: m.text,
            }));
        }
        Ok(retrieved)
    }

    /// Retrieve artifact context: each document queried against its own
    /// summary, so every document contributes excerpts even when the corpus
    /// spans unrelated subjects.
    async fn retrieve_for_artifacts(
        &self,
        documents: &[DocumentSummary],
    ) -> Result<Vec<RetrievedChunk>> {
        let mut retrieved = Vec::new();
        for doc in documents {
            let query_vector = embed_query(self.embedder.as_ref(), &doc.summary).await?;
            let matches = self
                .index
                .query(
                    &namespace_for_key(&doc.key),
                    &query_vector,
                    self.config.retrieval.artifact_top_k,
                )
                .await?;
            retrieved.extend(matches.into_iter().map(|m| RetrievedChunk {
                display_name: display_name(&m.source),
                text: m.text,
            }));
        }
        Ok(retrieved)
    }

    /// Run a chat turn: ingest, retrieve against the latest user message,
    /// and stream the completion.
    ///
    /// The returned stream yields text deltas in generation order. If
    /// `on_complete` is set it fires once with the full assistant text after
    /// the final delta, and not at all if the stream errors or is dropped.
    pub async fn chat_turn(
        &self,
        keys: &[String],
        history: &[ChatMessage],
        on_complete: Option<CompletionHook>,
    ) -> Result<ChatStream> {
        let question = last_user_message(history).ok_or(PipelineError::NoUserMessage)?;

        let report = self.ingest(keys).await?;
        if report.documents.is_empty() {
            bail!(PipelineError::NoContent);
        }
        let retrieved = self.retrieve_for_chat(&report.documents, question).await?;
        let system_prompt = assemble_system_prompt(&report.documents, &retrieved);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::new("system", system_prompt));
        messages.extend(history.iter().cloned());

        let inner = self
            .model
            .complete_stream(CompletionRequest {
                messages,
                temperature: self.config.generation.chat_temperature,
                max_tokens: self.config.generation.max_tokens,
                json_mode: false,
            })
            .await?;

        Ok(ChatStream::new(inner, on_complete))
    }

    /// One-shot chat answer; used by the CLI, which has no use for streaming.
    pub async fn ask(&self, keys: &[String], question: &str) -> Result<String> {
        let report = self.ingest(keys).await?;
        if report.documents.is_empty() {
            bail!(PipelineError::NoContent);
        }
        let retrieved = self.retrieve_for_chat(&report.documents, question).await?;
        let system_prompt = assemble_system_prompt(&report.documents, &retrieved);

        self.model
            .complete(CompletionRequest {
                messages: vec![
                    ChatMessage::new("system", system_prompt),
                    ChatMessage::new("user", question),
                ],
                temperature: self.config.generation.chat_temperature,
                max_tokens: self.config.generation.max_tokens,
                json_mode: false,
            })
            .await
    }

    /// Generate a validated set of exactly [`crate::validate::ARTIFACT_COUNT`]
    /// multiple-choice questions from the given documents.
    pub async fn build_mcq(&self, keys: &[String]) -> Result<Vec<McqQuestion>> {
        let (excerpts, topics) = self.artifact_context(keys).await?;
        generate_mcq(
            self.model.as_ref(),
            &topics,
            &excerpts,
            &self.config.generation,
        )
        .await
    }

    /// Generate a validated set of exactly [`crate::validate::ARTIFACT_COUNT`]
    /// flashcards from the given documents.
    pub async fn build_flashcards(&self, keys: &[String]) -> Result<Vec<Flashcard>> {
        let (excerpts, topics) = self.artifact_context(keys).await?;
        generate_flashcards(
            self.model.as_ref(),
            &topics,
            &excerpts,
            &self.config.generation,
        )
        .await
    }

    /// Shared artifact front half: ingest, topics call, summary-driven
    /// retrieval.
    async fn artifact_context(&self, keys: &[String]) -> Result<(String, Vec<String>)> {
        let report = self.ingest(keys).await?;
        if report.documents.is_empty() {
            bail!(PipelineError::NoContent);
        }

        let topics =
            generate_topics(self.model.as_ref(), &report.documents, &self.config.generation)
                .await?;
        let retrieved = self.retrieve_for_artifacts(&report.documents).await?;
        let excerpts = format_excerpts(&retrieved);

        Ok((excerpts, topics))
    }
}

/// The most recent user message in a chat history.
fn last_user_message(history: &[ChatMessage]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
}
