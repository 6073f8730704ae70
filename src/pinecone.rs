//! Pinecone-backed [`VectorIndex`] implementation.
//!
//! Talks to the Pinecone data-plane REST API (`/vectors/upsert` and
//! `/query`) on the configured index host. Requires the `PINECONE_API_KEY`
//! environment variable.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::IndexConfig;
use crate::index::VectorIndex;
use crate::models::{VectorEntry, VectorMatch};

pub struct PineconeIndex {
    host: String,
    api_key: String,
    client: reqwest::Client,
}

impl PineconeIndex {
    /// Create a client for the configured index host.
    ///
    /// # Errors
    ///
    /// Returns an error if `PINECONE_API_KEY` is not in the environment.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow::anyhow!("PINECONE_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("https://{}{}", self.host, path)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, namespace: &str, entries: Vec<VectorEntry>) -> Result<()> {
        let vectors: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id,
                    "values": e.vector,
                    "metadata": { "text": e.text, "source": e.source },
                })
            })
            .collect();

        let body = serde_json::json!({
            "vectors": vectors,
            "namespace": namespace,
        });

        let resp = self
            .client
            .post(self.url("/vectors/upsert"))
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Pinecone upsert failed (HTTP {}): {}", status, text);
        }

        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorMatch>> {
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "namespace": namespace,
            "includeMetadata": true,
        });

        let resp = self
            .client
            .post(self.url("/query"))
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Pinecone query failed (HTTP {}): {}", status, text);
        }

        let json: serde_json::Value = resp.json().await?;
        parse_query_response(&json)
    }
}

/// Parse a Pinecone `/query` response into [`VectorMatch`]es.
fn parse_query_response(json: &serde_json::Value) -> Result<Vec<VectorMatch>> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Pinecone response: missing matches array"))?;

    let mut results = Vec::with_capacity(matches.len());
    for m in matches {
        let score = m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
        let metadata = m.get("metadata");
        let text = metadata
            .and_then(|md| md.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        let source = metadata
            .and_then(|md| md.get("source"))
            .and_then(|s| s.as_str())
            .unwrap_or_default()
            .to_string();

        results.push(VectorMatch {
            score,
            text,
            source,
        });
    }

    Ok(results)
}
