//! Overlapping text chunker.
//!
//! Splits extracted document text into segments with a target size and a
//! fixed overlap between neighbours, so context at segment boundaries is not
//! lost at retrieval time. Cut points prefer natural boundaries: paragraph
//! break (`\n\n`), then sentence end, then whitespace, then a hard cut.
//!
//! Each chunk receives a synthetic id `{source_key}-{index}` used as the
//! vector id in the index, so re-ingesting a document overwrites its old
//! vectors entry-by-entry.

use crate::models::Chunk;

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Empty or whitespace-only text yields no chunks; the document is then
/// simply not indexed for retrieval. Indices are contiguous starting at 0.
pub fn chunk_text(source_key: &str, text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    while start < text.len() {
        let window_end = advance_chars(text, start, chunk_size);
        let end = if window_end >= text.len() {
            text.len()
        } else {
            match find_break(&text[start..window_end]) {
                Some(rel) => start + rel,
                None => window_end,
            }
        };

        let piece = text[start..end].trim();
        if !piece.is_empty() {
            chunks.push(make_chunk(source_key, index, piece));
            index += 1;
        }

        if end >= text.len() {
            break;
        }

        // Step back by the overlap, but always make forward progress.
        let next = retreat_chars(text, end, overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

fn make_chunk(source_key: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        id: format!("{}-{}", source_key, index),
        source_key: source_key.to_string(),
        index,
        text: text.to_string(),
    }
}

/// Find the best cut point within a window that does not end the text.
///
/// Returns a byte offset relative to the window, always > 0 so the caller
/// makes progress. `None` means no natural boundary exists and the caller
/// should hard-cut at the window end.
fn find_break(window: &str) -> Option<usize> {
    // Paragraph boundary: cut after the blank line.
    if let Some(pos) = window.rfind("\n\n") {
        if pos > 0 {
            return Some(pos + 2);
        }
    }

    // Sentence boundary: terminator followed by whitespace.
    let sentence_end = [". ", ".\n", "! ", "!\n", "? ", "?\n"]
        .iter()
        .filter_map(|pat| window.rfind(pat).map(|pos| pos + pat.len()))
        .max();
    if let Some(pos) = sentence_end {
        if pos > 1 {
            return Some(pos);
        }
    }

    // Any whitespace: cut after it.
    if let Some(pos) = window.rfind(char::is_whitespace) {
        if pos > 0 {
            let ws_len = window[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
            return Some(pos + ws_len);
        }
    }

    None
}

/// Byte index `n` characters forward from `from`, clamped to the text end.
fn advance_chars(text: &str, from: usize, n: usize) -> usize {
    match text[from..].char_indices().nth(n) {
        Some((offset, _)) => from + offset,
        None => text.len(),
    }
}

/// Byte index `n` characters backward from `from` (a char boundary).
fn retreat_chars(text: &str, from: usize, n: usize) -> usize {
    let mut idx = from;
    for _ in 0..n {
        if idx == 0 {
            break;
        }
        idx -= 1;
        while idx > 0 && !text.is_char_boundary(idx) {
            idx -= 1;
        }
    }
    idx
}
