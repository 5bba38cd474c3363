//! Per-kind text extraction for uploaded files.
//!
//! The retrieval pipeline ingests Text and Pdf files; the multimodal chat
//! path additionally handles Audio (transcription) and Image (vision
//! description). Extraction never panics: each failure becomes an error the
//! batch loop records inline, and one bad file never aborts the rest.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::models::FileKind;
use crate::provider;

/// Extraction error taxonomy for the retrieval-ingestion path.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedKind(FileKind),
    Io(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedKind(kind) => {
                write!(f, "unsupported file kind for ingestion: {}", kind.label())
            }
            ExtractError::Io(e) => write!(f, "read failed: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Read raw text from a file on disk for retrieval ingestion.
///
/// Only Text and Pdf kinds are indexable; audio and images go through the
/// multimodal chat path instead.
pub fn load_document_text(path: &Path) -> Result<String, ExtractError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match FileKind::from_name(&name) {
        FileKind::Text => {
            let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        FileKind::Pdf => {
            let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
            pdf_text(&bytes)
        }
        kind => Err(ExtractError::UnsupportedKind(kind)),
    }
}

fn pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Turn one uploaded file into a labeled context part for the multimodal
/// chat path. Provider or parse failures are substituted inline so the
/// caller's batch continues.
pub async fn describe_file(config: &Config, name: &str, bytes: Vec<u8>) -> String {
    let kind = FileKind::from_name(name);

    let result: Result<String> = match kind {
        FileKind::Audio => provider::transcribe(&config.provider, name, bytes).await,
        FileKind::Image => {
            provider::describe_image(&config.provider, name, &bytes, &config.prompt.language).await
        }
        FileKind::Pdf => match pdf_text(&bytes) {
            Ok(text) if text.trim().is_empty() => {
                return format!(
                    "[{}:{}] no text could be extracted from this PDF\n",
                    kind.label(),
                    name
                );
            }
            Ok(text) => Ok(text),
            Err(e) => Err(e.into()),
        },
        FileKind::Text => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        FileKind::Unsupported => {
            return format!("[{}:{}] this extension is not supported\n", kind.label(), name);
        }
    };

    match result {
        Ok(text) => format!("[{}:{}]\n{}\n", kind.label(), name, text),
        Err(e) => {
            log::error!("failed to process {}: {}", name, e);
            format!("[{}:{}] processing failed: {}\n", kind.label(), name, e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ProviderConfig};

    fn offline_config(dir: &Path) -> Config {
        let toml_str = format!(
            r#"[storage]
upload_dir = "{0}/uploads"
data_dir = "{0}/data"

[db]
path = "{0}/index.sqlite"

[server]
bind = "127.0.0.1:0"
"#,
            dir.display()
        );
        let mut config: Config = toml::from_str(&toml_str).unwrap();
        config.provider = ProviderConfig {
            disabled: true,
            ..ProviderConfig::default()
        };
        config
    }

    #[test]
    fn text_file_loads_lossy_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain text \xf0\x28 content").unwrap();
        let text = load_document_text(&path).unwrap();
        assert!(text.starts_with("plain text"));
    }

    #[test]
    fn invalid_pdf_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        let err = load_document_text(&path).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn audio_is_not_indexable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        let err = load_document_text(&path).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedKind(FileKind::Audio)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_document_text(Path::new("/nonexistent/x.txt")).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[tokio::test]
    async fn text_part_is_labeled() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        let part = describe_file(&config, "notes.txt", b"some notes".to_vec()).await;
        assert_eq!(part, "[text:notes.txt]\nsome notes\n");
    }

    #[tokio::test]
    async fn unsupported_part_is_inline_notice() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        let part = describe_file(&config, "archive.zip", vec![0u8; 4]).await;
        assert!(part.starts_with("[unsupported:archive.zip]"));
    }

    #[tokio::test]
    async fn provider_failure_becomes_inline_error_part() {
        let dir = tempfile::tempdir().unwrap();
        let config = offline_config(dir.path());
        let part = describe_file(&config, "memo.wav", vec![0u8; 4]).await;
        assert!(part.starts_with("[audio:memo.wav] processing failed:"));
    }
}
