//! Document loading and text extraction.
//!
//! Given storage keys, fetches raw bytes from the object store and extracts
//! plain text. PDF content is spooled to a temp file and handed to
//! `pdf-extract`; the temp file is removed on every exit path (success,
//! extraction failure, or panic unwind) because cleanup rides on the
//! [`tempfile::NamedTempFile`] drop guard.
//!
//! Loading is best-effort across a batch: a key that cannot be fetched or
//! yields no text is skipped with a warning and the remaining keys are still
//! processed. This intentionally differs from the fail-fast embedding step.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::models::LoadedDocument;
use crate::object_store::ObjectStore;

/// Number of characters of extracted text used as the document summary.
pub const SUMMARY_CHARS: usize = 500;

/// Load and extract text for a batch of storage keys, best-effort.
///
/// Keys that fail to fetch or produce no text are skipped with a warning on
/// stderr. The returned documents preserve the order of `keys`.
pub async fn load_documents(store: &dyn ObjectStore, keys: &[String]) -> Vec<LoadedDocument> {
    let mut docs = Vec::with_capacity(keys.len());
    for key in keys {
        match load_one(store, key).await {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                eprintln!("Warning: skipping document '{}': {:#}", key, e);
            }
        }
    }
    docs
}

async fn load_one(store: &dyn ObjectStore, key: &str) -> Result<LoadedDocument> {
    let bytes = store.fetch(key).await?;

    let raw_text = if key.to_ascii_lowercase().ends_with(".pdf") {
        extract_pdf_text(&bytes)?
    } else {
        String::from_utf8_lossy(&bytes).to_string()
    };

    let text = normalize_text(&raw_text);
    if text.is_empty() {
        bail!("no text extracted");
    }

    Ok(LoadedDocument {
        key: key.to_string(),
        display_name: display_name(key),
        summary: summary_of(&text),
        text,
    })
}

/// Extract text from PDF bytes via a spooled temp file.
fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    extract_pdf_text_in(&std::env::temp_dir(), bytes)
}

/// Like [`extract_pdf_text`] but spooling into `dir`; exposed for tests so
/// cleanup can be observed.
pub fn extract_pdf_text_in(dir: &Path, bytes: &[u8]) -> Result<String> {
    let mut spool = tempfile::Builder::new()
        .prefix("nbe-")
        .suffix(".pdf")
        .tempfile_in(dir)
        .context("Failed to create temp spool file")?;
    spool.write_all(bytes)?;
    spool.flush()?;

    // Spool is deleted when it drops, on the error path included.
    pdf_extract::extract_text(spool.path())
        .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))
}

/// Trim pages, drop blank ones, and rejoin with paragraph breaks.
///
/// `pdf-extract` separates pages with form feeds; scanned pages without a
/// text layer come through empty and are filtered here.
pub fn normalize_text(raw: &str) -> String {
    raw.split('\u{000C}')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// First [`SUMMARY_CHARS`] characters of the text, cut at a char boundary.
pub fn summary_of(text: &str) -> String {
    match text.char_indices().nth(SUMMARY_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Display name: the path tail of the storage key.
pub fn display_name(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::LocalObjectStore;

    #[test]
    fn display_name_is_path_tail() {
        assert_eq!(display_name("uploads/abc/math.pdf"), "math.pdf");
        assert_eq!(display_name("plain.txt"), "plain.txt");
    }

    #[test]
    fn summary_respects_char_boundaries() {
        let text = "é".repeat(SUMMARY_CHARS + 50);
        let summary = summary_of(&text);
        assert_eq!(summary.chars().count(), SUMMARY_CHARS);
    }

    #[test]
    fn short_text_summary_is_whole_text() {
        assert_eq!(summary_of("short"), "short");
    }

    #[test]
    fn normalize_drops_blank_pages() {
        let raw = "  page one  \u{000C}\u{000C}   \u{000C} page two ";
        assert_eq!(normalize_text(raw), "page one\n\npage two");
    }

    #[test]
    fn invalid_pdf_cleans_up_spool() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_pdf_text_in(dir.path(), b"not a pdf at all");
        assert!(result.is_err());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "spool file leaked: {:?}", leftovers);
    }

    #[tokio::test]
    async fn batch_load_skips_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha document text").unwrap();
        let store = LocalObjectStore::new(dir.path());

        let keys = vec!["a.txt".to_string(), "missing.txt".to_string()];
        let docs = load_documents(&store, &keys).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].key, "a.txt");
        assert_eq!(docs[0].display_name, "a.txt");
        assert_eq!(docs[0].summary, "alpha document text");
    }

    #[tokio::test]
    async fn empty_document_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.txt"), "   \n ").unwrap();
        let store = LocalObjectStore::new(dir.path());

        let docs = load_documents(&store, &["empty.txt".to_string()]).await;
        assert!(docs.is_empty());
    }
}
