//! Ingestion orchestration: registry bookkeeping plus the chunk → embed →
//! index pipeline.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::embed_texts;
use crate::extract::load_document_text;
use crate::index;
use crate::models::FileKind;
use crate::registry::{DocumentRegistry, StoreOutcome};

/// Result of a direct path-based ingest, without registry involvement.
#[derive(Debug, Default, Serialize)]
pub struct IngestReport {
    pub added_chunks: usize,
    pub failed_files: Vec<String>,
}

/// Per-batch counters returned to whoever uploaded the files.
#[derive(Debug, Default, Serialize)]
pub struct UploadReport {
    pub newly_ingested: Vec<String>,
    pub already_ingested: Vec<String>,
    pub skipped_too_large: Vec<String>,
    pub failed: Vec<String>,
    /// Registry size after the batch, duplicates included.
    pub total_registry: usize,
}

/// Chunk, embed and index one already-stored document. The file's original
/// name serves as the index source key, so re-ingesting replaces the old
/// rows rather than accumulating them.
pub async fn ingest_document(
    config: &Config,
    pool: &SqlitePool,
    source_id: &str,
    path: &Path,
) -> Result<usize> {
    let text = load_document_text(path)
        .with_context(|| format!("Failed to extract text from {}", path.display()))?;

    let chunks = chunk_document(
        source_id,
        &text,
        config.chunking.size,
        config.chunking.overlap,
    );
    if chunks.is_empty() {
        log::warn!("{}: no text to index", source_id);
        return Ok(0);
    }

    index::remove_source(pool, source_id).await?;

    let mut indexed = 0;
    for batch in chunks.chunks(config.provider.batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_texts(&config.provider, &texts).await?;
        indexed += index::add_chunks(pool, batch, &vectors).await?;
    }

    log::info!("{}: indexed {} chunks", source_id, indexed);
    Ok(indexed)
}

/// Chunk, embed and index a set of local files, keyed by filename. One bad
/// file is reported and skipped, never fatal to the rest.
pub async fn ingest_paths(
    config: &Config,
    pool: &SqlitePool,
    paths: &[std::path::PathBuf],
) -> Result<IngestReport> {
    let mut report = IngestReport::default();
    for path in paths {
        let source_id = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        match ingest_document(config, pool, &source_id, path).await {
            Ok(count) => report.added_chunks += count,
            Err(e) => {
                log::error!("{}: ingestion failed: {:#}", source_id, e);
                report.failed_files.push(source_id);
            }
        }
    }
    Ok(report)
}

/// Register, store and ingest one uploaded file, updating the registry flag
/// to reflect the outcome. Ingestion failures are recorded on the entry and
/// reported, never bubbled, so sibling files in the batch still proceed.
pub async fn upload_file(
    config: &Config,
    pool: &SqlitePool,
    registry: &DocumentRegistry,
    filename: &str,
    bytes: &[u8],
    report: &mut UploadReport,
) -> Result<()> {
    // Only indexable kinds are accepted; rejecting before the registry is
    // touched keeps unsupported uploads free of side effects. Audio and
    // images belong to the media chat path instead.
    if !matches!(FileKind::from_name(filename), FileKind::Text | FileKind::Pdf) {
        log::warn!("{}: unsupported extension for ingestion", filename);
        report.failed.push(filename.to_string());
        return Ok(());
    }

    let outcome = registry.register_and_store(filename, bytes, config.upload.max_bytes());

    let (content_hash, stored_filename, ingest_path) = match outcome {
        Ok(StoreOutcome::New {
            content_hash,
            stored_filename,
            ingest_path,
        }) => (content_hash, stored_filename, ingest_path),
        Ok(StoreOutcome::Duplicate { .. }) => {
            report.already_ingested.push(filename.to_string());
            return Ok(());
        }
        Ok(StoreOutcome::TooLarge { size, limit }) => {
            log::warn!("{}: {} bytes exceeds limit of {}", filename, size, limit);
            report.skipped_too_large.push(filename.to_string());
            return Ok(());
        }
        Err(e) => {
            log::error!("{}: store failed: {:#}", filename, e);
            report.failed.push(filename.to_string());
            return Ok(());
        }
    };

    // Index under the sanitized registry name, not the raw upload name, so
    // the delete path purges the same source key.
    match ingest_document(config, pool, &stored_filename, &ingest_path).await {
        Ok(_) => {
            registry.mark_ingested(&content_hash, true, None)?;
            report.newly_ingested.push(filename.to_string());
        }
        Err(e) => {
            log::error!("{}: ingestion failed: {:#}", filename, e);
            registry.mark_ingested(&content_hash, false, Some(format!("{:#}", e)))?;
            report.failed.push(filename.to_string());
        }
    }

    Ok(())
}

/// Upload a whole batch and fill in the final registry total.
pub async fn upload_batch(
    config: &Config,
    pool: &SqlitePool,
    registry: &DocumentRegistry,
    files: Vec<(String, Vec<u8>)>,
) -> Result<UploadReport> {
    let mut report = UploadReport::default();
    for (filename, bytes) in files {
        upload_file(config, pool, registry, &filename, &bytes, &mut report).await?;
    }
    report.total_registry = registry.len()?;
    Ok(report)
}
