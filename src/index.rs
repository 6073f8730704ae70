//! Vector index abstraction and namespace derivation.
//!
//! Each source document gets its own namespace, derived deterministically
//! from its storage key, so a query against one document's namespace can
//! never return chunks belonging to another document.
//!
//! Two implementations are provided: [`crate::pinecone::PineconeIndex`] for
//! production and [`MemoryIndex`] (brute-force cosine similarity) for
//! development and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::models::{VectorEntry, VectorMatch};

/// A namespaced vector store with upsert and top-K similarity query.
///
/// Upserts are last-write-wins per vector id; the pipeline assumes no
/// exclusive access and takes no locks around namespace writes.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert all entries into `namespace` in one call, so a document's
    /// chunks reach the index together or not at all.
    async fn upsert(&self, namespace: &str, entries: Vec<VectorEntry>) -> Result<()>;

    /// Return up to `top_k` nearest entries by similarity, best first.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>>;
}

/// Derive the index namespace for a storage key.
///
/// Stable (same input → same output) and collision-resistant: a lowercase
/// ASCII slug keeps namespaces readable, and a truncated SHA-256 of the raw
/// key disambiguates keys that fold to the same slug (e.g. `café.pdf` and
/// `cafe.pdf`).
pub fn namespace_for_key(key: &str) -> String {
    let mut slug: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if slug.len() > 24 {
        slug.truncate(24);
    }
    let slug = slug.trim_matches('-');

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hex::encode(hasher.finalize());

    if slug.is_empty() {
        digest[..16].to_string()
    } else {
        format!("{}-{}", slug, &digest[..16])
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// In-memory index for development and tests.
///
/// Brute-force cosine similarity over all stored vectors in a namespace.
#[derive(Default)]
pub struct MemoryIndex {
    namespaces: RwLock<HashMap<String, HashMap<String, VectorEntry>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, namespace: &str, entries: Vec<VectorEntry>) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        let ns = namespaces.entry(namespace.to_string()).or_default();
        for entry in entries {
            ns.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let namespaces = self.namespaces.read().unwrap();
        let Some(ns) = namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = ns
            .values()
            .map(|entry| VectorMatch {
                score: cosine_similarity(vector, &entry.vector),
                text: entry.text.clone(),
                source: entry.source.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// Create the configured [`VectorIndex`].
pub fn create_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    match config.index.provider.as_str() {
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        "pinecone" => Ok(Arc::new(crate::pinecone::PineconeIndex::new(&config.index)?)),
        other => bail!("Unknown index provider: {}", other),
    }
}
