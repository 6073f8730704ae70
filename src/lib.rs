//! # Notebook Engine
//!
//! The generation backend for a document-grounded study notebook.
//!
//! Notebook Engine turns a student's uploaded documents into grounded chat
//! answers, flashcards, and multiple-choice quizzes. Every request runs the
//! same pipeline front half (fetch, extract, chunk, embed, index into
//! per-document namespaces) and then retrieves context for one of three
//! generation routes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │ ObjectStore │──▶│   Pipeline    │──▶│ VectorIndex │
//! │  Local/S3   │   │ Chunk+Embed  │   │ Mem/Pinecone│
//! └─────────────┘   └──────┬───────┘   └─────┬──────┘
//!                          │                 │
//!                          ▼                 ▼
//!                   ┌────────────┐    ┌────────────┐
//!                   │  ChatModel │◀───│  Retrieval  │
//!                   │  (OpenAI)  │    │  + Context  │
//!                   └─────┬──────┘    └────────────┘
//!                         │
//!              ┌──────────┴──────────┐
//!              ▼                     ▼
//!         ┌──────────┐        ┌──────────┐
//!         │   CLI    │        │   HTTP   │
//!         │  (nbe)   │        │ (axum)   │
//!         └──────────┘        └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`object_store`] | Document fetch abstraction (local, S3) |
//! | [`loader`] | Text extraction (PDF and plain text) |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Namespaced vector index (memory, Pinecone) |
//! | [`context`] | Prompt context assembly |
//! | [`generation`] | Chat-completion client, streaming and single-shot |
//! | [`validate`] | Strict artifact validation |
//! | [`pipeline`] | End-to-end orchestration |
//! | [`chatlog`] | Chat persistence |
//! | [`server`] | HTTP API server |

pub mod chatlog;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod index;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod object_store;
pub mod pinecone;
pub mod pipeline;
pub mod s3;
pub mod server;
pub mod validate;
