//! Chat-completion client abstraction.
//!
//! Defines the [`ChatModel`] trait with a single-shot `complete` call and a
//! streaming `complete_stream` call, plus the OpenAI-compatible
//! implementation. Streaming responses are server-sent events: `data:` lines
//! carrying JSON deltas, terminated by `data: [DONE]`.
//!
//! The structured generators (`generate_topics`, `generate_mcq`,
//! `generate_flashcards`) issue the two sequential single-shot calls the
//! MCQ/flashcard routes need and run their output through [`crate::validate`].
//! No retries happen here; a failed call surfaces to the caller.

use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use crate::config::GenerationConfig;
use crate::models::{ChatMessage, DocumentSummary, Flashcard, McqQuestion};
use crate::validate;

/// Ordered sequence of text deltas from a streaming completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Called exactly once with the full assistant text after the stream ends.
pub type CompletionHook = Box<dyn FnOnce(String) + Send>;

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Ask the API for a JSON object response.
    pub json_mode: bool,
}

/// A chat-completion model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Single-shot completion; returns the assistant message content.
    async fn complete(&self, req: CompletionRequest) -> Result<String>;

    /// Streaming completion; deltas are yielded in generation order.
    async fn complete_stream(&self, req: CompletionRequest) -> Result<TokenStream>;
}

// ============ OpenAI-compatible implementation ============

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiChatModel {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn request_body(&self, req: &CompletionRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": req.messages,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
        });
        if stream {
            body["stream"] = serde_json::Value::Bool(true);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .context("Failed to send request to chat model")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("Chat model API error {}: {}", status, text);
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, req: CompletionRequest) -> Result<String> {
        let body = self.request_body(&req, false);
        let response = self.send(&body).await?;

        let json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse chat model response")?;

        let content = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or_default();

        if content.is_empty() {
            bail!("Chat model returned no content");
        }

        Ok(content.to_string())
    }

    async fn complete_stream(&self, req: CompletionRequest) -> Result<TokenStream> {
        let body = self.request_body(&req, true);
        let response = self.send(&body).await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<Result<String>>(32);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(anyhow::anyhow!("Failed to read stream chunk: {}", e)))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer.drain(..line_end + 1);

                    match parse_sse_line(&line) {
                        SseLine::Delta(delta) => {
                            if tx.send(Ok(delta)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Ignore => {}
                    }
                }
            }
        });

        Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}

/// Create the configured [`ChatModel`].
pub fn create_model(config: &GenerationConfig) -> Result<std::sync::Arc<dyn ChatModel>> {
    Ok(std::sync::Arc::new(OpenAiChatModel::new(config)?))
}

/// One parsed line of a `/chat/completions` SSE body.
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Delta(String),
    Done,
    Ignore,
}

/// Parse one SSE line. Keep-alives, role deltas, and unparsable data lines
/// are ignored rather than failing the stream.
pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data: ") else {
        return SseLine::Ignore;
    };

    if data == "[DONE]" {
        return SseLine::Done;
    }

    let Ok(json) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseLine::Ignore;
    };

    match json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
    {
        Some(content) if !content.is_empty() => SseLine::Delta(content.to_string()),
        _ => SseLine::Ignore,
    }
}

// ============ Completion-hook stream ============

/// Wraps a [`TokenStream`], accumulating deltas and firing a
/// [`CompletionHook`] exactly once when the stream ends.
///
/// The hook receives the exact concatenation of every delta yielded, in
/// order. It does not fire if the stream is dropped before completion, so a
/// cancelled request never persists a partial assistant message as complete.
pub struct ChatStream {
    inner: TokenStream,
    collected: String,
    on_complete: Option<CompletionHook>,
    done: bool,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("collected", &self.collected)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl ChatStream {
    pub fn new(inner: TokenStream, on_complete: Option<CompletionHook>) -> Self {
        Self {
            inner,
            collected: String::new(),
            on_complete,
            done: false,
        }
    }
}

impl Stream for ChatStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(delta))) => {
                this.collected.push_str(&delta);
                Poll::Ready(Some(Ok(delta)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.done = true;
                if let Some(hook) = this.on_complete.take() {
                    hook(std::mem::take(&mut this.collected));
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============ Structured generation ============

/// Topics call: extract exactly 5 key topics from the document summaries.
pub async fn generate_topics(
    model: &dyn ChatModel,
    summaries: &[DocumentSummary],
    config: &GenerationConfig,
) -> Result<Vec<String>> {
    let joined = summaries
        .iter()
        .map(|s| format!("[{}] {}", s.display_name, s.summary))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Here are summaries of a student's documents:\n{}\n\n\
         Extract exactly 5 key topics or concepts covered by these documents. \
         Respond with a JSON object of the form {{\"topics\": [\"...\", \"...\", \"...\", \"...\", \"...\"]}} \
         and nothing else.",
        joined
    );

    let raw = model
        .complete(CompletionRequest {
            messages: vec![ChatMessage::new("user", prompt)],
            temperature: config.topic_temperature,
            max_tokens: config.max_tokens,
            json_mode: true,
        })
        .await?;

    validate::parse_topics(&raw).map_err(|e| anyhow::anyhow!("topics response invalid: {}", e))
}

/// Artifact call: generate exactly 5 multiple-choice questions.
pub async fn generate_mcq(
    model: &dyn ChatModel,
    topics: &[String],
    excerpts: &str,
    config: &GenerationConfig,
) -> Result<Vec<McqQuestion>> {
    let prompt = format!(
        "You are writing a quiz for a student. Key topics:\n{}\n\n\
         Document excerpts:\n{}\n\n\
         Write exactly 5 multiple-choice questions grounded in these excerpts. \
         Respond with a JSON object of the form \
         {{\"questions\": [{{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
         \"correctAnswer\": \"...\", \"explanation\": \"...\"}}]}}. \
         Each question must have exactly 4 options and correctAnswer must be \
         copied verbatim from the options.",
        topics.join("\n"),
        excerpts
    );

    let raw = model
        .complete(CompletionRequest {
            messages: vec![ChatMessage::new("user", prompt)],
            temperature: config.artifact_temperature,
            max_tokens: config.max_tokens,
            json_mode: true,
        })
        .await?;

    validate::parse_mcq(&raw).map_err(|e| anyhow::anyhow!("MCQ response invalid: {}", e))
}

/// Artifact call: generate exactly 5 flashcards.
pub async fn generate_flashcards(
    model: &dyn ChatModel,
    topics: &[String],
    excerpts: &str,
    config: &GenerationConfig,
) -> Result<Vec<Flashcard>> {
    let prompt = format!(
        "You are writing study flashcards. Key topics:\n{}\n\n\
         Document excerpts:\n{}\n\n\
         Write exactly 5 flashcards grounded in these excerpts. Respond with a \
         JSON array of the form [{{\"front\": \"...\", \"back\": \"...\"}}] and \
         nothing else, with no wrapper object.",
        topics.join("\n"),
        excerpts
    );

    let raw = model
        .complete(CompletionRequest {
            messages: vec![ChatMessage::new("user", prompt)],
            temperature: config.artifact_temperature,
            max_tokens: config.max_tokens,
            json_mode: false,
        })
        .await?;

    validate::parse_flashcards(&raw)
        .map_err(|e| anyhow::anyhow!("flashcard response invalid: {}", e))
}
