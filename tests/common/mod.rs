//! Shared test doubles: a deterministic keyword embedder and a scripted
//! chat model, so pipeline behaviour can be asserted without network access.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures_util::stream;
use serde_json::json;

use notebook_engine::embedding::Embedder;
use notebook_engine::generation::{ChatModel, CompletionRequest, TokenStream};

/// Word-bucket vector: texts sharing words land near each other under
/// cosine similarity, which is all retrieval assertions need.
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 16];
    for word in text.split_whitespace() {
        let mut h: usize = 0;
        for b in word.to_lowercase().bytes() {
            h = h.wrapping_mul(31).wrapping_add(b as usize);
        }
        v[h % 16] += 1.0;
    }
    v
}

pub struct KeywordEmbedder {
    fail_on: Option<String>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self { fail_on: None }
    }

    /// Refuse any batch containing the marker, to exercise fail-fast
    /// ingestion.
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        16
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(marker) = &self.fail_on {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                bail!("embedding refused: input contains '{}'", marker);
            }
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Chat model that replays scripted responses.
///
/// `complete` pops the next scripted completion; `complete_stream` replays
/// the configured deltas. Every request is recorded for assertions.
pub struct ScriptedModel {
    completions: Mutex<VecDeque<String>>,
    deltas: Vec<String>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(completions: Vec<String>, deltas: Vec<&str>) -> Self {
        Self {
            completions: Mutex::new(completions.into()),
            deltas: deltas.into_iter().map(String::from).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, req: CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(req);
        match self.completions.lock().unwrap().pop_front() {
            Some(response) => Ok(response),
            None => bail!("no scripted completion left"),
        }
    }

    async fn complete_stream(&self, req: CompletionRequest) -> Result<TokenStream> {
        self.requests.lock().unwrap().push(req);
        let deltas: Vec<Result<String>> = self.deltas.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(deltas)))
    }
}

/// Model that never answers within any test deadline, for exercising the
/// request budget. The sleep is dropped when the caller's timeout fires.
pub struct StalledModel;

#[async_trait]
impl ChatModel for StalledModel {
    async fn complete(&self, _req: CompletionRequest) -> Result<String> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        bail!("stalled model woke up")
    }

    async fn complete_stream(&self, _req: CompletionRequest) -> Result<TokenStream> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        bail!("stalled model woke up")
    }
}

pub fn topics_json() -> String {
    json!({"topics": ["limits", "derivatives", "integrals", "series", "continuity"]}).to_string()
}

pub fn mcq_json(count: usize) -> String {
    let questions: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            json!({
                "question": format!("What does concept {} describe?", i),
                "options": ["A", "B", "C", "D"],
                "correctAnswer": "C",
                "explanation": "The excerpts say so.",
            })
        })
        .collect();
    json!({ "questions": questions }).to_string()
}

pub fn flashcards_json(count: usize) -> String {
    let cards: Vec<serde_json::Value> = (0..count)
        .map(|i| json!({"front": format!("Term {}", i), "back": format!("Definition {}", i)}))
        .collect();
    serde_json::Value::Array(cards).to_string()
}

/// PDF built through `lopdf`, for exercising the loader against a
/// writer-produced file rather than a hand-assembled one.
pub fn lopdf_pdf_with_text(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![100.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Minimal valid PDF containing `phrase`, with correct xref offsets so
/// `pdf-extract` can parse it.
pub fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET\n", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!("4 0 obj << /Length {} >> stream\n{}endstream endobj\n", content.len(), content)
            .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
