//! Core data models used throughout ragdesk.
//!
//! These types represent the chunks, registry entries, and retrieval results
//! that flow through the ingestion and answering pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A bounded, overlapping window of a normalized document.
///
/// Immutable once produced by the chunker; ownership moves to the vector
/// index for embedding and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Identifier of the originating document (its ingestion path).
    pub source_id: String,
    /// Contiguous position of this chunk within its document, starting at 0.
    pub sequence_index: i64,
}

impl Chunk {
    /// Deterministic index id: `<source>__<index>`. Stable across re-ingestion
    /// because chunk boundaries are deterministic.
    pub fn chunk_id(&self) -> String {
        format!("{}__{}", self.source_id, self.sequence_index)
    }
}

/// One registered upload, keyed by the SHA-256 of its raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub content_hash: String,
    pub original_filename: String,
    /// Content-addressed copy: `uploads/<hash><ext>`.
    pub stored_path_primary: String,
    /// Human-readable copy: `data/<filename>`.
    pub stored_path_secondary: String,
    /// True only after the vector index confirmed the content was stored.
    pub ingested: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// A ranked retrieval result for one query. Not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedSnippet {
    pub text: String,
    pub source: String,
    pub chunk_index: i64,
    /// 1-based rank by descending similarity.
    pub rank: usize,
}

/// Closed dispatch over upload file types, chosen once per file from the
/// filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Image,
    Pdf,
    Text,
    Unsupported,
}

impl FileKind {
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "wav" | "mp3" | "m4a" | "ogg" => FileKind::Audio,
            "png" | "jpg" | "jpeg" => FileKind::Image,
            "pdf" => FileKind::Pdf,
            "txt" | "md" => FileKind::Text,
            _ => FileKind::Unsupported,
        }
    }

    /// Label used in context part headers, e.g. `[audio:memo.wav]`.
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Audio => "audio",
            FileKind::Image => "image",
            FileKind::Pdf => "pdf",
            FileKind::Text => "text",
            FileKind::Unsupported => "unsupported",
        }
    }
}
