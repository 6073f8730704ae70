//! HTTP API tests: the router is served on an ephemeral port and exercised
//! with a real client, with scripted model/embedder doubles behind it.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use notebook_engine::config::Config;
use notebook_engine::db::connect_memory;
use notebook_engine::index::MemoryIndex;
use notebook_engine::migrate::run_migrations_on;
use notebook_engine::object_store::LocalObjectStore;
use notebook_engine::pipeline::Pipeline;
use notebook_engine::server::{build_router, AppState};

use notebook_engine::generation::ChatModel;

use common::{
    flashcards_json, mcq_json, topics_json, KeywordEmbedder, ScriptedModel, StalledModel,
};

const NOTES_TEXT: &[u8] = b"Photosynthesis converts light into chemical energy.\n\n\
Chlorophyll absorbs red and blue light in the leaf.";

struct TestServer {
    _dir: tempfile::TempDir,
    base_url: String,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn spawn_server(model: ScriptedModel) -> TestServer {
    spawn_server_with(Arc::new(model), Config::default()).await
}

async fn spawn_server_with(model: Arc<dyn ChatModel>, config: Config) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), NOTES_TEXT).unwrap();
    std::fs::write(dir.path().join("blank.txt"), b"   \n ").unwrap();

    let pipeline = Pipeline::new(
        Arc::new(LocalObjectStore::new(dir.path())),
        Arc::new(KeywordEmbedder::new()),
        Arc::new(MemoryIndex::new()),
        model,
        config,
    );

    let pool = connect_memory().await.unwrap();
    run_migrations_on(&pool).await.unwrap();

    let app = build_router(AppState::new(Arc::new(pipeline), pool));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        _dir: dir,
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn health_reports_ok_and_version() {
    let server = spawn_server(ScriptedModel::new(vec![], vec![])).await;

    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(!body["version"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn chat_turn_without_file_keys_is_rejected() {
    let server = spawn_server(ScriptedModel::new(vec![], vec![])).await;

    let resp = server
        .client
        .post(server.url("/generate-chat-turn"))
        .json(&json!({"messages": [{"role": "user", "content": "hi"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("fileKey"));
}

#[tokio::test]
async fn chat_turn_with_empty_messages_is_rejected() {
    let server = spawn_server(ScriptedModel::new(vec![], vec![])).await;

    let resp = server
        .client
        .post(server.url("/generate-chat-turn"))
        .json(&json!({"messages": [], "fileKey": "notes.txt"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = server
        .client
        .post(server.url("/generate-chat-turn"))
        .json(&json!({
            "messages": [{"role": "user", "content": "  "}],
            "fileKey": "notes.txt"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn unknown_chat_id_is_404() {
    let server = spawn_server(ScriptedModel::new(vec![], vec!["hi"])).await;

    let resp = server
        .client
        .post(server.url("/generate-chat-turn"))
        .json(&json!({
            "messages": [{"role": "user", "content": "What is photosynthesis?"}],
            "fileKey": "notes.txt",
            "chatId": "does-not-exist"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Chat not found"));
}

#[tokio::test]
async fn chat_turn_streams_text_and_persists_both_messages() {
    let server =
        spawn_server(ScriptedModel::new(vec![], vec!["Light ", "becomes ", "sugar."])).await;

    let resp = server
        .client
        .post(server.url("/chats"))
        .json(&json!({"title": "Biology"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let chat_id = resp.json::<Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = server
        .client
        .post(server.url("/generate-chat-turn"))
        .json(&json!({
            "messages": [{"role": "user", "content": "What is photosynthesis?"}],
            "fileKey": "notes.txt",
            "chatId": chat_id
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(resp.text().await.unwrap(), "Light becomes sugar.");

    // The assistant message lands after the stream finishes; poll briefly.
    let mut messages = Vec::new();
    for _ in 0..40 {
        let resp = server
            .client
            .get(server.url(&format!("/chats/{}/messages", chat_id)))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        messages = resp.json::<Vec<Value>>().await.unwrap();
        if messages.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(messages.len(), 2, "messages: {:?}", messages);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "What is photosynthesis?");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "Light becomes sugar.");
}

#[tokio::test]
async fn mcq_endpoint_returns_five_camel_case_questions() {
    let server = spawn_server(ScriptedModel::new(vec![topics_json(), mcq_json(5)], vec![])).await;

    let resp = server
        .client
        .post(server.url("/generate-mcq"))
        .json(&json!({"fileKeys": ["notes.txt"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 5);
    for q in questions {
        assert!(q["question"].is_string());
        assert_eq!(q["options"].as_array().unwrap().len(), 4);
        assert!(q["correctAnswer"].is_string());
        assert!(q["explanation"].is_string());
    }
}

#[tokio::test]
async fn flashcards_endpoint_returns_top_level_array() {
    let server =
        spawn_server(ScriptedModel::new(vec![topics_json(), flashcards_json(5)], vec![])).await;

    let resp = server
        .client
        .post(server.url("/generate-flashcards"))
        .json(&json!({"fileKey": "notes.txt"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let cards: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(cards.len(), 5);
    assert!(cards.iter().all(|c| c["front"].is_string() && c["back"].is_string()));
}

#[tokio::test]
async fn malformed_model_output_surfaces_as_500_with_details() {
    let server = spawn_server(ScriptedModel::new(
        vec![topics_json(), "this is not JSON".to_string()],
        vec![],
    ))
    .await;

    let resp = server
        .client
        .post(server.url("/generate-mcq"))
        .json(&json!({"fileKey": "notes.txt"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "MCQ generation failed");
    assert!(body["details"].as_str().unwrap().contains("not valid JSON"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn chat_over_a_blank_document_is_rejected_with_400() {
    let server =
        spawn_server(ScriptedModel::new(vec![], vec!["a made ", "up answer"])).await;

    let resp = server
        .client
        .post(server.url("/generate-chat-turn"))
        .json(&json!({
            "messages": [{"role": "user", "content": "What does the document say?"}],
            "fileKey": "blank.txt"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("No content could be extracted"));
}

#[tokio::test]
async fn blown_deadline_returns_408_and_no_partial_artifact() {
    let mut config = Config::default();
    config.pipeline.timeout_secs = 1;
    let server = spawn_server_with(Arc::new(StalledModel), config).await;

    let resp = server
        .client
        .post(server.url("/generate-mcq"))
        .json(&json!({"fileKey": "notes.txt"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 408);

    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("timed out"));
    assert!(body.get("questions").is_none(), "partial artifact returned: {}", body);
}

#[tokio::test]
async fn artifact_request_without_keys_is_rejected() {
    let server = spawn_server(ScriptedModel::new(vec![], vec![])).await;

    let resp = server
        .client
        .post(server.url("/generate-flashcards"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn listing_messages_of_unknown_chat_is_404() {
    let server = spawn_server(ScriptedModel::new(vec![], vec![])).await;

    let resp = server
        .client
        .get(server.url("/chats/nope/messages"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
