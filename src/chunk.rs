//! Fixed-size overlapping text chunker.
//!
//! Splits normalized document text into windows of `size` characters that
//! overlap by `overlap` characters. Whitespace is normalized (runs collapsed
//! to a single space, ends trimmed) before boundaries are computed, so the
//! same input always produces the same chunks — required for stable chunk IDs
//! in the vector index.

use crate::models::Chunk;

/// Collapse all whitespace runs to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            in_space = true;
        } else {
            if in_space && !out.is_empty() {
                out.push(' ');
            }
            in_space = false;
            out.push(ch);
        }
    }
    out
}

/// Split text into overlapping windows of `size` characters.
///
/// Boundaries are computed over the normalized text. Every chunk except
/// possibly the last has exactly `size` characters. The start offset advances
/// by `size - overlap`; if that would not move forward (misconfigured
/// `overlap >= size`), a minimum advance of 1 guarantees termination.
///
/// Empty input yields an empty vector. `size >= len` yields a single chunk.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    let chars: Vec<char> = normalized.chars().collect();
    let n = chars.len();

    if n == 0 || size == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < n {
        let end = (start + size).min(n);
        chunks.push(chars[start..end].iter().collect());

        let advance = size.saturating_sub(overlap).max(1);
        start += advance;
    }

    chunks
}

/// Chunk a document's text and wrap the windows into [`Chunk`]s with
/// contiguous indices starting at 0.
pub fn chunk_document(source_id: &str, text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    chunk_text(text, size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            text,
            source_id: source_id.to_string(),
            sequence_index: i as i64,
        })
        .collect()
}
