//! Chat completion, audio transcription, and image description providers.
//!
//! All three are OpenAI endpoints reached through the same retry policy as
//! embeddings (429/5xx/network → backoff and retry, other 4xx → immediate
//! failure). Calls are blocking from the request's point of view: no
//! cancellation propagates once a call is issued, and each call carries the
//! configured timeout.

use anyhow::Result;
use base64::Engine;
use std::time::{Duration, Instant};

use crate::config::ProviderConfig;

/// Classified provider failures, carried inside `anyhow::Error` so callers
/// can downcast instead of matching on message text.
#[derive(Debug)]
pub enum ProviderError {
    /// `provider.disabled` is set in config.
    Disabled,
    /// `OPENAI_API_KEY` is not set in the environment.
    MissingKey,
    /// The provider API returned an error response.
    Api(String),
    /// The request never reached the provider.
    Network(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Disabled => {
                write!(f, "Provider is disabled. Unset provider.disabled in config.")
            }
            ProviderError::MissingKey => write!(f, "OPENAI_API_KEY not set"),
            ProviderError::Api(msg) => write!(f, "{}", msg),
            ProviderError::Network(msg) => write!(f, "request failed: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// One chat message in provider wire format.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: serde_json::Value,
}

impl ChatMessage {
    pub fn system(text: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: serde_json::Value::String(text.to_string()),
        }
    }

    pub fn user(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: serde_json::Value::String(text.to_string()),
        }
    }
}

fn api_key() -> Result<String> {
    std::env::var("OPENAI_API_KEY").map_err(|_| ProviderError::MissingKey.into())
}

fn http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Ask the chat-completions endpoint for an answer.
pub async fn chat(
    config: &ProviderConfig,
    messages: &[ChatMessage],
    max_tokens: u32,
    temperature: f32,
) -> Result<String> {
    if config.disabled {
        return Err(ProviderError::Disabled.into());
    }

    let key = api_key()?;
    let client = http_client(config)?;

    let body = serde_json::json!({
        "model": config.chat_model,
        "messages": messages,
        "max_tokens": max_tokens,
        "temperature": temperature,
    });

    let started = Instant::now();
    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(format!("{}/chat/completions", config.api_base))
            .header("Authorization", format!("Bearer {}", key))
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    let answer = parse_chat_response(&json)?;
                    log::info!(
                        "chat completed in {:.3}s ({} chars)",
                        started.elapsed().as_secs_f64(),
                        answer.chars().count()
                    );
                    return Ok(answer);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(ProviderError::Api(format!(
                        "chat API error {}: {}",
                        status, body_text
                    )));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                return Err(
                    ProviderError::Api(format!("chat API error {}: {}", status, body_text)).into(),
                );
            }
            Err(e) => {
                last_err = Some(ProviderError::Network(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| ProviderError::Api("Chat completion failed after retries".to_string()))
        .into())
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message content"))
}

/// Transcribe audio bytes via the transcription endpoint. The original
/// filename is preserved on the multipart part so the provider can infer
/// the container format.
pub async fn transcribe(config: &ProviderConfig, filename: &str, bytes: Vec<u8>) -> Result<String> {
    if config.disabled {
        return Err(ProviderError::Disabled.into());
    }

    let key = api_key()?;
    let client = http_client(config)?;

    let started = Instant::now();
    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        // multipart forms are consumed on send, so rebuild per attempt
        let part = reqwest::multipart::Part::bytes(bytes.clone())
            .file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("model", config.transcribe_model.clone())
            .part("file", part);

        let resp = client
            .post(format!("{}/audio/transcriptions", config.api_base))
            .header("Authorization", format!("Bearer {}", key))
            .multipart(form)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    let text = json
                        .get("text")
                        .and_then(|t| t.as_str())
                        .map(|s| s.to_string())
                        .ok_or_else(|| {
                            anyhow::anyhow!("Invalid transcription response: missing text")
                        })?;
                    log::info!(
                        "transcribed {} in {:.3}s",
                        filename,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(text);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(ProviderError::Api(format!(
                        "transcription API error {}: {}",
                        status, body_text
                    )));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                return Err(ProviderError::Api(format!(
                    "transcription API error {}: {}",
                    status, body_text
                ))
                .into());
            }
            Err(e) => {
                last_err = Some(ProviderError::Network(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| ProviderError::Api("Transcription failed after retries".to_string()))
        .into())
}

/// Describe an image with the vision-capable chat model (temperature 0,
/// image passed inline as a base64 data URL).
pub async fn describe_image(
    config: &ProviderConfig,
    filename: &str,
    bytes: &[u8],
    language: &str,
) -> Result<String> {
    let mime = mime_guess::from_path(filename)
        .first_or_octet_stream()
        .to_string();
    let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);

    let instruction = format!(
        "Summarize the content of this image in {}. Stick to the facts and be concise.",
        language
    );

    let messages = vec![ChatMessage {
        role: "user".to_string(),
        content: serde_json::json!([
            {"type": "text", "text": instruction},
            {"type": "image_url", "image_url": {"url": format!("data:{};base64,{}", mime, b64)}}
        ]),
    }];

    let description = chat(config, &messages, 256, 0.0).await?;
    Ok(description.trim().to_string())
}
