//! Object store abstraction.
//!
//! The pipeline fetches raw document bytes by opaque storage key. Two
//! backends are provided: [`crate::s3::S3ObjectStore`] for production and
//! [`LocalObjectStore`] for development and tests.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::Config;

/// Fetches raw bytes for a storage key.
///
/// Implementations must be safe to share across requests; the pipeline holds
/// a single instance behind an `Arc` and never mutates it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the raw bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not exist or the backend is
    /// unreachable. Callers on the ingestion path treat this as a
    /// per-document skip, not a batch failure.
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;
}

/// Object store rooted at a local directory; keys are relative paths.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let rel = sanitize_key(key)?;
        let path = self.root.join(rel);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read object '{}'", key))
    }
}

/// Reject keys that would escape the store root.
fn sanitize_key(key: &str) -> Result<PathBuf> {
    let path = Path::new(key);
    if path.is_absolute() {
        bail!("Invalid object key '{}': absolute paths not allowed", key);
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => bail!("Invalid object key '{}'", key),
        }
    }
    Ok(path.to_path_buf())
}

/// Create the configured [`ObjectStore`] backend.
pub fn create_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.backend.as_str() {
        "local" => Ok(Arc::new(LocalObjectStore::new(config.storage.root.clone()))),
        "s3" => Ok(Arc::new(crate::s3::S3ObjectStore::new(&config.storage)?)),
        other => bail!("Unknown storage backend: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        let store = LocalObjectStore::new(dir.path());
        let bytes = store.fetch("notes.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.fetch("nope.pdf").await.is_err());
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        assert!(store.fetch("../escape.txt").await.is_err());
        assert!(store.fetch("/etc/hosts").await.is_err());
    }
}
