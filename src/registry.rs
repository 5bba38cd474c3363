//! Content-addressed document registry.
//!
//! Every upload is keyed by the SHA-256 of its raw bytes; identical content
//! uploaded under different names maps to the same entry. The registry is a
//! single JSON document on disk, rewritten atomically (temp file + rename)
//! after every mutation, so a reader always sees either the prior state or
//! the complete new state, never a partial write.
//!
//! Each stored file exists twice:
//!
//! ```text
//! uploads/<sha256><ext>     collision-free primary copy
//! data/<original-name>      human-readable copy handed to ingestion
//! ```
//!
//! An entry's `ingested` flag flips to true only after the vector index
//! confirms the content was stored; failures leave `ingested = false` with
//! the error recorded on the entry.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::models::RegistryEntry;

/// Outcome of registering one upload.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome {
    /// First time this content was seen; stored and pending ingestion.
    New {
        content_hash: String,
        /// Sanitized filename the entry was recorded under. Doubles as the
        /// index source key so a later delete purges the same rows.
        stored_filename: String,
        /// Path handed to the ingestion pipeline (the human-readable copy).
        ingest_path: PathBuf,
    },
    /// Content hash already present and fully ingested; nothing stored.
    Duplicate { content_hash: String },
    /// Byte length exceeded the limit; nothing stored, nothing recorded.
    TooLarge { size: u64, limit: u64 },
}

/// Result of deleting a registered document.
#[derive(Debug, Clone)]
pub struct DeleteReport {
    pub filename: String,
    /// Paths that actually existed and were removed.
    pub deleted_files: Vec<String>,
}

/// Error taxonomy for delete.
#[derive(Debug)]
pub enum DeleteError {
    NotFound,
    Io(anyhow::Error),
}

impl std::fmt::Display for DeleteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteError::NotFound => write!(f, "document not found"),
            DeleteError::Io(e) => write!(f, "delete failed: {}", e),
        }
    }
}

impl std::error::Error for DeleteError {}

/// Handle on the on-disk registry. Holds paths only; every operation is a
/// fresh read-modify-persist cycle (last writer wins, per the accepted
/// weak-consistency model).
pub struct DocumentRegistry {
    registry_path: PathBuf,
    upload_dir: PathBuf,
    data_dir: PathBuf,
}

impl DocumentRegistry {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            registry_path: storage.registry_path(),
            upload_dir: storage.upload_dir.clone(),
            data_dir: storage.data_dir.clone(),
        }
    }

    /// Register `bytes` under `filename` and store both file copies.
    ///
    /// Returns [`StoreOutcome::TooLarge`] with no side effects when the size
    /// limit is exceeded, [`StoreOutcome::Duplicate`] when the hash is already
    /// present with `ingested = true`, and [`StoreOutcome::New`] otherwise.
    /// On a storage failure the entry is still recorded with the error so the
    /// listing surfaces it, and the error is returned alongside via the entry.
    pub fn register_and_store(
        &self,
        filename: &str,
        bytes: &[u8],
        size_limit: u64,
    ) -> Result<StoreOutcome> {
        if bytes.len() as u64 > size_limit {
            return Ok(StoreOutcome::TooLarge {
                size: bytes.len() as u64,
                limit: size_limit,
            });
        }

        let filename = safe_filename(filename);
        let content_hash = sha256_hex(bytes);

        let mut registry = self.load()?;

        if registry
            .get(&content_hash)
            .map(|e| e.ingested)
            .unwrap_or(false)
        {
            return Ok(StoreOutcome::Duplicate { content_hash });
        }

        let ext = Path::new(&filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        let primary = self.upload_dir.join(format!("{}{}", content_hash, ext));
        let secondary = self.data_dir.join(&filename);

        let store_result = self.write_copies(&primary, &secondary, bytes);

        let entry = RegistryEntry {
            content_hash: content_hash.clone(),
            original_filename: filename.clone(),
            stored_path_primary: primary.display().to_string(),
            stored_path_secondary: secondary.display().to_string(),
            ingested: false,
            error: store_result.as_ref().err().map(|e| e.to_string()),
        };
        registry.insert(content_hash.clone(), entry);
        self.persist(&registry)?;

        store_result?;

        Ok(StoreOutcome::New {
            content_hash,
            stored_filename: filename,
            ingest_path: secondary,
        })
    }

    /// Flip the ingestion flag for `content_hash`. On failure the entry keeps
    /// `ingested = false` and carries the error message.
    pub fn mark_ingested(
        &self,
        content_hash: &str,
        success: bool,
        error: Option<String>,
    ) -> Result<()> {
        let mut registry = self.load()?;
        if let Some(entry) = registry.get_mut(content_hash) {
            entry.ingested = success;
            entry.error = if success { None } else { error };
            self.persist(&registry)?;
        }
        Ok(())
    }

    /// All entries sorted by original filename ascending (stable ordering for
    /// UI consumption; ties broken by hash via the underlying BTreeMap order).
    pub fn list(&self) -> Result<Vec<RegistryEntry>> {
        let registry = self.load()?;
        let mut entries: Vec<RegistryEntry> = registry.into_values().collect();
        entries.sort_by(|a, b| a.original_filename.cmp(&b.original_filename));
        Ok(entries)
    }

    /// Number of registered documents.
    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.load()?.is_empty())
    }

    /// Look up a single entry.
    pub fn get(&self, content_hash: &str) -> Result<Option<RegistryEntry>> {
        Ok(self.load()?.remove(content_hash))
    }

    /// Remove the entry and both backing files. A file that is already gone
    /// is not an error; a file that exists but cannot be removed is.
    pub fn delete(&self, content_hash: &str) -> std::result::Result<DeleteReport, DeleteError> {
        let mut registry = self.load().map_err(DeleteError::Io)?;

        let entry = match registry.remove(content_hash) {
            Some(e) => e,
            None => return Err(DeleteError::NotFound),
        };

        let mut deleted_files = Vec::new();
        for path_str in [&entry.stored_path_primary, &entry.stored_path_secondary] {
            let path = Path::new(path_str);
            match std::fs::remove_file(path) {
                Ok(()) => deleted_files.push(path_str.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(DeleteError::Io(anyhow::anyhow!(
                        "failed to remove {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }

        self.persist(&registry).map_err(DeleteError::Io)?;

        Ok(DeleteReport {
            filename: entry.original_filename,
            deleted_files,
        })
    }

    fn write_copies(&self, primary: &Path, secondary: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.upload_dir)
            .with_context(|| format!("failed to create {}", self.upload_dir.display()))?;
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;

        // Written unconditionally: the path is content-addressed, so the only
        // thing an existing file can hold is these bytes or a truncated
        // earlier attempt. Rewriting repairs the latter.
        std::fs::write(primary, bytes)
            .with_context(|| format!("failed to write {}", primary.display()))?;
        std::fs::copy(primary, secondary).with_context(|| {
            format!(
                "failed to copy {} to {}",
                primary.display(),
                secondary.display()
            )
        })?;
        Ok(())
    }

    fn load(&self) -> Result<BTreeMap<String, RegistryEntry>> {
        match std::fs::read_to_string(&self.registry_path) {
            Ok(content) => serde_json::from_str(&content).with_context(|| {
                format!(
                    "failed to parse registry: {}",
                    self.registry_path.display()
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| {
                format!("failed to read registry: {}", self.registry_path.display())
            }),
        }
    }

    fn persist(&self, registry: &BTreeMap<String, RegistryEntry>) -> Result<()> {
        if let Some(parent) = self.registry_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(registry)?;

        // Atomic replace: readers see the old document or the new one, never
        // a torn write.
        let tmp_path = self.registry_path.with_extension("json.tmp");
        let mut tmp = std::fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);
        std::fs::rename(&tmp_path, &self.registry_path).with_context(|| {
            format!(
                "failed to replace registry: {}",
                self.registry_path.display()
            )
        })?;
        Ok(())
    }
}

/// SHA-256 of raw bytes as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Strip path separators so an upload cannot escape the data directory.
fn safe_filename(name: &str) -> String {
    let cleaned: String = name
        .replace(['\\', '/'], "_")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use tempfile::TempDir;

    fn test_registry() -> (TempDir, DocumentRegistry) {
        let tmp = TempDir::new().unwrap();
        let storage = StorageConfig {
            upload_dir: tmp.path().join("uploads"),
            data_dir: tmp.path().join("data"),
            registry_path: None,
        };
        let registry = DocumentRegistry::new(&storage);
        (tmp, registry)
    }

    #[test]
    fn new_upload_stores_both_copies() {
        let (_tmp, registry) = test_registry();

        let outcome = registry
            .register_and_store("notes.txt", b"hello registry", 1024)
            .unwrap();

        let (hash, ingest_path) = match outcome {
            StoreOutcome::New {
                content_hash,
                ingest_path,
                ..
            } => (content_hash, ingest_path),
            other => panic!("expected New, got {:?}", other),
        };

        assert_eq!(hash, sha256_hex(b"hello registry"));
        assert!(ingest_path.ends_with("notes.txt"));
        assert!(ingest_path.exists());

        let entries = registry.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].ingested);
        assert!(entries[0].error.is_none());
        assert!(Path::new(&entries[0].stored_path_primary).exists());
        assert!(entries[0].stored_path_primary.contains(&hash));
    }

    #[test]
    fn duplicate_after_ingestion_stores_nothing_new() {
        let (_tmp, registry) = test_registry();

        let outcome = registry
            .register_and_store("a.txt", b"same bytes", 1024)
            .unwrap();
        let hash = match outcome {
            StoreOutcome::New { content_hash, .. } => content_hash,
            other => panic!("expected New, got {:?}", other),
        };
        registry.mark_ingested(&hash, true, None).unwrap();

        let second = registry
            .register_and_store("a.txt", b"same bytes", 1024)
            .unwrap();
        assert_eq!(
            second,
            StoreOutcome::Duplicate {
                content_hash: hash.clone()
            }
        );
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn identical_bytes_different_names_share_one_entry() {
        let (_tmp, registry) = test_registry();

        let first = registry
            .register_and_store("alpha.txt", b"identical content", 1024)
            .unwrap();
        let hash_a = match first {
            StoreOutcome::New { content_hash, .. } => content_hash,
            other => panic!("expected New, got {:?}", other),
        };
        registry.mark_ingested(&hash_a, true, None).unwrap();

        let second = registry
            .register_and_store("beta.txt", b"identical content", 1024)
            .unwrap();
        match second {
            StoreOutcome::Duplicate { content_hash } => assert_eq!(content_hash, hash_a),
            other => panic!("expected Duplicate, got {:?}", other),
        }
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn not_yet_ingested_upload_is_retried_not_duplicated() {
        let (_tmp, registry) = test_registry();

        registry
            .register_and_store("a.txt", b"pending bytes", 1024)
            .unwrap();
        // ingested is still false: a re-upload goes through the New path again
        // so ingestion can be retried, but the registry stays at one entry.
        let second = registry
            .register_and_store("a.txt", b"pending bytes", 1024)
            .unwrap();
        assert!(matches!(second, StoreOutcome::New { .. }));
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn oversized_upload_leaves_no_trace() {
        let (tmp, registry) = test_registry();

        let outcome = registry
            .register_and_store("big.bin", &vec![0u8; 100], 10)
            .unwrap();
        assert_eq!(
            outcome,
            StoreOutcome::TooLarge {
                size: 100,
                limit: 10
            }
        );
        assert_eq!(registry.len().unwrap(), 0);
        assert!(!tmp.path().join("uploads").exists() || {
            std::fs::read_dir(tmp.path().join("uploads"))
                .map(|d| d.filter_map(|e| e.ok()).count() == 0)
                .unwrap_or(true)
        });
    }

    #[test]
    fn mark_ingested_failure_records_error() {
        let (_tmp, registry) = test_registry();

        let outcome = registry
            .register_and_store("f.txt", b"content", 1024)
            .unwrap();
        let hash = match outcome {
            StoreOutcome::New { content_hash, .. } => content_hash,
            other => panic!("expected New, got {:?}", other),
        };

        registry
            .mark_ingested(&hash, false, Some("embedding failed".to_string()))
            .unwrap();

        let entry = registry.get(&hash).unwrap().unwrap();
        assert!(!entry.ingested);
        assert_eq!(entry.error.as_deref(), Some("embedding failed"));

        registry.mark_ingested(&hash, true, None).unwrap();
        let entry = registry.get(&hash).unwrap().unwrap();
        assert!(entry.ingested);
        assert!(entry.error.is_none());
    }

    #[test]
    fn delete_unknown_hash_is_not_found() {
        let (_tmp, registry) = test_registry();
        let err = registry.delete("deadbeef").unwrap_err();
        assert!(matches!(err, DeleteError::NotFound));
        assert_eq!(registry.len().unwrap(), 0);
    }

    #[test]
    fn delete_removes_entry_and_both_files() {
        let (_tmp, registry) = test_registry();

        let outcome = registry
            .register_and_store("gone.txt", b"to be deleted", 1024)
            .unwrap();
        let hash = match outcome {
            StoreOutcome::New { content_hash, .. } => content_hash,
            other => panic!("expected New, got {:?}", other),
        };

        let report = registry.delete(&hash).unwrap();
        assert_eq!(report.filename, "gone.txt");
        assert_eq!(report.deleted_files.len(), 2);
        for path in &report.deleted_files {
            assert!(!Path::new(path).exists());
        }
        assert_eq!(registry.len().unwrap(), 0);
    }

    #[test]
    fn delete_tolerates_missing_backing_file() {
        let (_tmp, registry) = test_registry();

        let outcome = registry
            .register_and_store("half.txt", b"partial", 1024)
            .unwrap();
        let (hash, ingest_path) = match outcome {
            StoreOutcome::New {
                content_hash,
                ingest_path,
                ..
            } => (content_hash, ingest_path),
            other => panic!("expected New, got {:?}", other),
        };

        std::fs::remove_file(&ingest_path).unwrap();

        let report = registry.delete(&hash).unwrap();
        // only the primary copy remained
        assert_eq!(report.deleted_files.len(), 1);
        assert_eq!(registry.len().unwrap(), 0);
    }

    #[test]
    fn list_is_sorted_by_filename() {
        let (_tmp, registry) = test_registry();

        registry.register_and_store("zeta.txt", b"zzz", 1024).unwrap();
        registry.register_and_store("alpha.txt", b"aaa", 1024).unwrap();
        registry.register_and_store("mid.txt", b"mmm", 1024).unwrap();

        let names: Vec<String> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.original_filename)
            .collect();
        assert_eq!(names, vec!["alpha.txt", "mid.txt", "zeta.txt"]);
    }

    #[test]
    fn filenames_are_sanitized() {
        let (tmp, registry) = test_registry();

        let outcome = registry
            .register_and_store("../../etc/passwd", b"nope", 1024)
            .unwrap();
        let (stored_filename, ingest_path) = match outcome {
            StoreOutcome::New {
                stored_filename,
                ingest_path,
                ..
            } => (stored_filename, ingest_path),
            other => panic!("expected New, got {:?}", other),
        };
        // Separators are replaced, so the stored file is a direct child of
        // data/ and cannot escape it. Leading dots are left alone.
        assert_eq!(stored_filename, ".._.._etc_passwd");
        assert_eq!(ingest_path.parent(), Some(tmp.path().join("data").as_path()));
        assert_eq!(
            ingest_path.file_name().and_then(|n| n.to_str()),
            Some(".._.._etc_passwd")
        );
        assert!(ingest_path.exists());

        // The outcome's name matches the recorded entry, so consumers keying
        // an external store on it will be purged by a later delete.
        let entries = registry.list().unwrap();
        assert_eq!(entries[0].original_filename, stored_filename);
    }

    #[test]
    fn truncated_primary_is_repaired_on_reupload() {
        let (tmp, registry) = test_registry();

        let bytes = b"the full content";
        let hash = sha256_hex(bytes);
        let primary = tmp.path().join("uploads").join(format!("{}.txt", hash));
        std::fs::create_dir_all(primary.parent().unwrap()).unwrap();
        std::fs::write(&primary, b"the fu").unwrap();

        registry
            .register_and_store("notes.txt", bytes, 1024)
            .unwrap();

        assert_eq!(std::fs::read(&primary).unwrap(), bytes);
    }

    #[test]
    fn registry_survives_reload() {
        let (tmp, registry) = test_registry();

        registry
            .register_and_store("persist.txt", b"durable", 1024)
            .unwrap();

        let storage = StorageConfig {
            upload_dir: tmp.path().join("uploads"),
            data_dir: tmp.path().join("data"),
            registry_path: None,
        };
        let reopened = DocumentRegistry::new(&storage);
        let entries = reopened.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original_filename, "persist.txt");
    }
}
